use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use tracing::warn;

/// Server settings. Owned by the [`Server`](crate::net::server::Server) and
/// shared with its connection tasks; there is no global instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: IpAddr,
    pub port: u16,

    /// Initial size of the per-connection read buffer. Doubled whenever a
    /// request needs more room.
    pub buffer_size: usize,

    pub proxy_prefix: String,
    pub upstream_base: String,
    pub proxy_chunk_size: usize,

    pub server_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 42069,
            buffer_size: 8,

            proxy_prefix: "/httpbin/".to_string(),
            upstream_base: "http://httpbin.org".to_string(),
            proxy_chunk_size: 1024,

            server_name: "rawhttp/0.1".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &str) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path, error = %err, "failed to read config, falling back to defaults");
                return ServerConfig::default();
            }
        };

        match Self::from_toml(&content) {
            Ok(server_config) => server_config,
            Err(err) => {
                warn!(path, error = %err, "failed to deserialize config, falling back to defaults");
                ServerConfig::default()
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<ServerConfig>(content)
    }
}
