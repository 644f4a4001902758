//! Upstream side of the streaming proxy.
//!
//! [`Upstream`] is the seam the proxy fetches through. [`HttpUpstream`] is a
//! small HTTP/1.1 client over a plain TCP stream: it sends one `GET` with
//! `connection: close` and exposes the response body through
//! [`UpstreamResponse::read`], decoding `content-length`, chunked or
//! close-delimited framing. TLS is not supported.

use async_std::io::{BufReadExt, BufReader, Read, ReadExt, WriteExt};
use async_std::net::TcpStream;
use std::io;
use thiserror::Error;
use tracing::debug;
use url::Url;
use futures::future::BoxFuture;

use crate::http::chunked::decode_chunk_size;
use crate::http::headers::{HeaderError, Headers};
use crate::http::status::StatusCode;
use crate::http::CRLF;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("invalid upstream url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("unsupported upstream scheme: {0}")]
    UnsupportedScheme(String),

    #[error("upstream url has no host: {0}")]
    MissingHost(String),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("upstream I/O error: {0}")]
    Io(#[from] io::Error),
}

pub trait Upstream: Send + Sync + 'static {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<UpstreamResponse, UpstreamError>>;
}

pub type UpstreamReader = Box<dyn Read + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    Length(u64),
    Chunked { remaining: u64, finished: bool },
    UntilClose,
}

pub struct UpstreamResponse {
    status: StatusCode,
    headers: Headers,
    reader: BufReader<UpstreamReader>,
    framing: BodyFraming,
}

impl UpstreamResponse {
    /// Reads the status line and headers from `reader`, leaving it positioned
    /// at the start of the body.
    pub async fn from_reader(reader: UpstreamReader) -> Result<Self, UpstreamError> {
        let mut reader = BufReader::new(reader);

        let status_line = read_line(&mut reader).await?;
        let status = parse_status_line(&status_line)?;

        let mut headers = Headers::new();
        loop {
            let line = read_line(&mut reader).await?;
            if line.is_empty() {
                return Err(UpstreamError::MalformedResponse(
                    "connection closed inside headers".to_string(),
                ));
            }
            match headers.parse(&line)? {
                (_, true) => break,
                (0, false) => {
                    return Err(UpstreamError::MalformedResponse(format!(
                        "header line without CRLF: {:?}",
                        String::from_utf8_lossy(&line)
                    )));
                }
                _ => {}
            }
        }

        let framing = body_framing(&headers)?;

        Ok(Self {
            status,
            headers,
            reader,
            framing,
        })
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Reads decoded body bytes into `buf`. Returns `Ok(0)` once the body is
    /// exhausted.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        match &mut self.framing {
            BodyFraming::Length(remaining) => {
                if *remaining == 0 {
                    return Ok(0);
                }
                let max = (*remaining).min(buf.len() as u64) as usize;
                let n = self.reader.read(&mut buf[..max]).await?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "upstream closed before content-length was reached",
                    ));
                }
                *remaining -= n as u64;
                Ok(n)
            }
            BodyFraming::Chunked {
                remaining,
                finished,
            } => {
                if *finished {
                    return Ok(0);
                }

                if *remaining == 0 {
                    let line = read_line(&mut self.reader).await?;
                    let (size, _) = decode_chunk_size(&line).ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "invalid chunk size line")
                    })?;

                    if size == 0 {
                        // trailers are dropped
                        loop {
                            let line = read_line(&mut self.reader).await?;
                            if line.is_empty() || line == CRLF {
                                break;
                            }
                        }
                        *finished = true;
                        return Ok(0);
                    }
                    *remaining = size as u64;
                }

                let max = (*remaining).min(buf.len() as u64) as usize;
                let n = self.reader.read(&mut buf[..max]).await?;
                if n == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "upstream closed inside a chunk",
                    ));
                }
                *remaining -= n as u64;

                if *remaining == 0 {
                    let mut terminator = [0u8; 2];
                    self.reader.read_exact(&mut terminator).await?;
                    if terminator != CRLF {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "chunk not terminated by CRLF",
                        ));
                    }
                }
                Ok(n)
            }
            BodyFraming::UntilClose => self.reader.read(buf).await,
        }
    }
}

/// Reads one line including its `\n`. Empty at end of stream.
async fn read_line(reader: &mut BufReader<UpstreamReader>) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).await?;
    Ok(line)
}

fn parse_status_line(line: &[u8]) -> Result<StatusCode, UpstreamError> {
    let malformed = || {
        UpstreamError::MalformedResponse(format!(
            "bad status line: {:?}",
            String::from_utf8_lossy(line)
        ))
    };

    let line = std::str::from_utf8(line).map_err(|_| malformed())?;
    let mut parts = line.trim_end().splitn(3, ' ');

    match (parts.next(), parts.next()) {
        (Some(version), Some(code)) if version.starts_with("HTTP/") => code
            .parse::<u16>()
            .map(StatusCode)
            .map_err(|_| malformed()),
        _ => Err(malformed()),
    }
}

fn body_framing(headers: &Headers) -> Result<BodyFraming, UpstreamError> {
    let chunked = headers
        .get("transfer-encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
    if chunked {
        return Ok(BodyFraming::Chunked {
            remaining: 0,
            finished: false,
        });
    }

    match headers.get("content-length") {
        Some(raw) => raw
            .parse::<u64>()
            .map(BodyFraming::Length)
            .map_err(|_| UpstreamError::MalformedResponse(format!("bad content-length: {raw:?}"))),
        None => Ok(BodyFraming::UntilClose),
    }
}

/// Fetches over plain `http://` URLs.
pub struct HttpUpstream {
    user_agent: String,
}

impl HttpUpstream {
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
        }
    }
}

impl Upstream for HttpUpstream {
    fn fetch<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<UpstreamResponse, UpstreamError>> {
        Box::pin(async move {
            if url.scheme() != "http" {
                return Err(UpstreamError::UnsupportedScheme(url.scheme().to_string()));
            }
            let host = url
                .host_str()
                .ok_or_else(|| UpstreamError::MissingHost(url.to_string()))?;
            let port = url.port_or_known_default().unwrap_or(80);

            let mut target = url.path().to_string();
            if let Some(query) = url.query() {
                target.push('?');
                target.push_str(query);
            }

            let mut headers = Headers::new();
            match url.port() {
                Some(port) => headers.set("host", &format!("{host}:{port}")),
                None => headers.set("host", host),
            }
            headers.set("user-agent", &self.user_agent);
            headers.set("accept", "*/*");
            headers.set("connection", "close");

            let mut stream = TcpStream::connect((host, port)).await?;
            let head = format!("GET {} HTTP/1.1\r\n{}\r\n", target, headers.stringify());
            stream.write_all(head.as_bytes()).await?;
            debug!(%url, "upstream request sent");

            let response = UpstreamResponse::from_reader(Box::new(stream)).await?;
            debug!(%url, status = response.status().as_u16(), "upstream response head received");
            Ok(response)
        })
    }
}
