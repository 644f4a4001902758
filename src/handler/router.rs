use futures::future::BoxFuture;

use crate::config::ServerConfig;
use crate::handler::proxy::StreamingProxy;
use crate::handler::responses;
use crate::handler::{Handler, HandlerError};
use crate::http::request::Request;
use crate::http::response::ResponseWriter;
use crate::http::status::StatusCode;
use crate::net::upstream::{HttpUpstream, Upstream};

/// Maps request targets to responses:
/// - targets under the proxy prefix are relayed upstream,
/// - `/yourproblem` answers 400, `/myproblem` answers 500,
/// - everything else answers 200.
pub struct Router<U = HttpUpstream> {
    proxy: StreamingProxy<U>,
}

impl Router<HttpUpstream> {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_upstream(config, HttpUpstream::new(&config.server_name))
    }
}

impl<U: Upstream> Router<U> {
    pub fn with_upstream(config: &ServerConfig, upstream: U) -> Self {
        Self {
            proxy: StreamingProxy::new(
                &config.proxy_prefix,
                &config.upstream_base,
                config.proxy_chunk_size,
                upstream,
            ),
        }
    }

    pub async fn route(
        &self,
        writer: &mut ResponseWriter<'_>,
        req: &Request,
    ) -> Result<(), HandlerError> {
        if self.proxy.matches(req.target()) {
            return self.proxy.handle(writer, req).await;
        }

        match req.target() {
            "/yourproblem" => {
                responses::html(writer, StatusCode::BAD_REQUEST, responses::BAD_REQUEST_HTML).await
            }
            "/myproblem" => {
                responses::html(
                    writer,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    responses::INTERNAL_SERVER_ERROR_HTML,
                )
                .await
            }
            _ => responses::html(writer, StatusCode::OK, responses::SUCCESS_HTML).await,
        }
    }
}

impl<U: Upstream> Handler for Router<U> {
    fn call<'a, 'w>(
        &'a self,
        writer: &'a mut ResponseWriter<'w>,
        req: &'a Request,
    ) -> BoxFuture<'a, Result<(), HandlerError>>
    where
        'w: 'a,
    {
        Box::pin(self.route(writer, req))
    }
}
