//! Streaming reverse proxy.
//!
//! Requests whose target starts with the configured prefix are forwarded to
//! the upstream base URL with the prefix stripped. The upstream body is
//! relayed block by block as a chunked response, followed by trailers carrying
//! the SHA-256 digest and length of everything that was forwarded.

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use url::Url;
use futures::future::BoxFuture;

use crate::handler::{Handler, HandlerError};
use crate::http::chunked::encode_chunk;
use crate::http::headers::Headers;
use crate::http::request::Request;
use crate::http::response::{ResponseWriter, default_headers};
use crate::http::status::StatusCode;
use crate::net::upstream::{Upstream, UpstreamError};

pub const CONTENT_SHA256_TRAILER: &str = "x-content-sha256";
pub const CONTENT_LENGTH_TRAILER: &str = "x-content-length";

pub struct StreamingProxy<U> {
    prefix: String,
    upstream_base: String,
    chunk_size: usize,
    upstream: U,
}

impl<U: Upstream> StreamingProxy<U> {
    pub fn new(prefix: &str, upstream_base: &str, chunk_size: usize, upstream: U) -> Self {
        Self {
            prefix: prefix.to_string(),
            upstream_base: upstream_base.trim_end_matches('/').to_string(),
            chunk_size: chunk_size.max(1),
            upstream,
        }
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    pub fn matches(&self, target: &str) -> bool {
        target.starts_with(&self.prefix)
    }

    /// Maps `/prefix/rest` to `<upstream_base>/rest`.
    pub fn upstream_url(&self, target: &str) -> Result<Url, UpstreamError> {
        let suffix = target.strip_prefix(&self.prefix).unwrap_or(target);
        let url = format!("{}/{}", self.upstream_base, suffix.trim_start_matches('/'));
        Url::parse(&url).map_err(|source| UpstreamError::InvalidUrl { url, source })
    }

    pub async fn handle(
        &self,
        writer: &mut ResponseWriter<'_>,
        req: &Request,
    ) -> Result<(), HandlerError> {
        let fetched = match self.upstream_url(req.target()) {
            Ok(url) => {
                info!(%url, "proxying request");
                self.upstream.fetch(&url).await
            }
            Err(err) => Err(err),
        };

        let mut response = match fetched {
            Ok(response) => response,
            Err(err) => {
                warn!(path = req.target(), error = %err, "upstream fetch failed");
                writer
                    .write_status_line(StatusCode::INTERNAL_SERVER_ERROR)
                    .await?;
                writer.write_headers(&default_headers(0)).await?;
                return Ok(());
            }
        };

        writer.write_status_line(StatusCode::OK).await?;

        let mut headers = Headers::new();
        headers.set("content-type", "text/plain");
        headers.set("connection", "close");
        headers.set("transfer-encoding", "chunked");
        headers.set(
            "trailer",
            &format!("{CONTENT_SHA256_TRAILER}, {CONTENT_LENGTH_TRAILER}"),
        );
        writer.write_headers(&headers).await?;

        let mut hasher = Sha256::new();
        let mut total = 0usize;
        let mut buf = vec![0u8; self.chunk_size];

        loop {
            let n = match response.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    // the status line is already out; finish the body with what we have
                    warn!(error = %err, forwarded = total, "upstream body read failed");
                    break;
                }
            };
            debug!(bytes = n, "forwarding upstream block");

            hasher.update(&buf[..n]);
            total += n;
            writer.write_chunked_body(&encode_chunk(&buf[..n])).await?;
        }

        writer.write_last_chunk().await?;

        let mut trailers = Headers::new();
        trailers.set(CONTENT_SHA256_TRAILER, &format!("{:x}", hasher.finalize()));
        trailers.set(CONTENT_LENGTH_TRAILER, &total.to_string());
        writer.write_trailers(&trailers).await?;
        writer.write_chunked_body_done().await?;

        info!(path = req.target(), bytes = total, "proxied response complete");
        Ok(())
    }
}

impl<U: Upstream> Handler for StreamingProxy<U> {
    fn call<'a, 'w>(
        &'a self,
        writer: &'a mut ResponseWriter<'w>,
        req: &'a Request,
    ) -> BoxFuture<'a, Result<(), HandlerError>>
    where
        'w: 'a,
    {
        Box::pin(self.handle(writer, req))
    }
}
