//! A small HTTP/1.1 server built directly on TCP.
//!
//! - [`http`]: header collection, incremental request parser, response writer
//!   and chunked framing.
//! - [`net`]: the connection-accepting [`Server`](net::server::Server) and the
//!   upstream client used by the proxy.
//! - [`handler`]: the [`Handler`](handler::Handler) contract, the demo
//!   [`Router`](handler::Router) and the streaming proxy.

pub mod config;
pub mod handler;
pub mod http;
pub mod net;
