//! Response writer bound to one connection.
//!
//! [`ResponseWriter`] walks a fixed sequence of states and rejects any call
//! made out of order before touching the sink:
//!
//! ```text
//! Initial -> StatusWritten -> HeadersWritten -> BodyWritten
//! ```
//!
//! A body is either written once with [`ResponseWriter::write_body`] or as a
//! series of chunks with [`ResponseWriter::write_chunked_body`], ended by
//! [`ResponseWriter::write_last_chunk`], [`ResponseWriter::write_trailers`]
//! and [`ResponseWriter::write_chunked_body_done`].

use async_std::io::{Write, WriteExt};
use thiserror::Error;

use crate::http::chunked::{LAST_CHUNK, decode_chunk_size};
use crate::http::headers::Headers;
use crate::http::status::StatusCode;
use crate::http::CRLF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Initial,
    StatusWritten,
    HeadersWritten,
    BodyWritten,
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("writer not in proper state: expected {expected:?}, found {actual:?}")]
    InvalidWriterState {
        expected: WriterState,
        actual: WriterState,
    },

    #[error("invalid chunk framing")]
    InvalidChunk,

    #[error("short write: expected {expected} bytes, wrote {written}")]
    ShortWrite { expected: usize, written: usize },

    #[error("I/O error while writing response: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ResponseWriter<'a> {
    sink: &'a mut (dyn Write + Send + Unpin),
    state: WriterState,
}

impl<'a> ResponseWriter<'a> {
    pub fn new(sink: &'a mut (dyn Write + Send + Unpin)) -> Self {
        Self {
            sink,
            state: WriterState::Initial,
        }
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    fn expect_state(&self, expected: WriterState) -> Result<(), WriterError> {
        if self.state != expected {
            return Err(WriterError::InvalidWriterState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    pub async fn write_status_line(&mut self, status: StatusCode) -> Result<(), WriterError> {
        self.expect_state(WriterState::Initial)?;
        self.sink.write_all(status.status_line().as_bytes()).await?;
        self.state = WriterState::StatusWritten;
        Ok(())
    }

    pub async fn write_headers(&mut self, headers: &Headers) -> Result<(), WriterError> {
        self.expect_state(WriterState::StatusWritten)?;
        let mut head = headers.stringify();
        head.push_str("\r\n");
        self.sink.write_all(head.as_bytes()).await?;
        self.state = WriterState::HeadersWritten;
        Ok(())
    }

    /// Writes `body` as-is and completes the response.
    pub async fn write_body(&mut self, body: &[u8]) -> Result<usize, WriterError> {
        self.expect_state(WriterState::HeadersWritten)?;
        self.sink.write_all(body).await?;
        self.sink.flush().await?;
        self.state = WriterState::BodyWritten;
        Ok(body.len())
    }

    /// Writes one pre-framed chunk (`<hex-size>\r\n<payload>\r\n`).
    ///
    /// The payload goes out in a single write whose length must match the
    /// declared size. The returned count covers the payload only, although
    /// the size line and trailing CRLF go out on the wire as well. May be
    /// called any number of times until
    /// [`write_chunked_body_done`](Self::write_chunked_body_done).
    pub async fn write_chunked_body(&mut self, chunk: &[u8]) -> Result<usize, WriterError> {
        self.expect_state(WriterState::HeadersWritten)?;

        let (size, offset) = decode_chunk_size(chunk).ok_or(WriterError::InvalidChunk)?;
        let end = offset.checked_add(size).ok_or(WriterError::InvalidChunk)?;
        let payload = chunk.get(offset..end).ok_or(WriterError::InvalidChunk)?;
        if !chunk.get(end..).is_some_and(|rest| rest.starts_with(CRLF)) {
            return Err(WriterError::InvalidChunk);
        }

        self.sink.write_all(&chunk[..offset]).await?;
        let written = self.sink.write(payload).await?;
        if written != size {
            return Err(WriterError::ShortWrite {
                expected: size,
                written,
            });
        }
        self.sink.write_all(CRLF).await?;

        Ok(written)
    }

    /// Writes the zero-size chunk that ends a chunked body. Trailers, if any,
    /// follow through [`write_trailers`](Self::write_trailers).
    pub async fn write_last_chunk(&mut self) -> Result<(), WriterError> {
        self.expect_state(WriterState::HeadersWritten)?;
        self.sink.write_all(LAST_CHUNK).await?;
        Ok(())
    }

    pub async fn write_chunked_body_done(&mut self) -> Result<(), WriterError> {
        self.expect_state(WriterState::HeadersWritten)?;
        self.sink.flush().await?;
        self.state = WriterState::BodyWritten;
        Ok(())
    }

    /// Writes trailer fields and the blank line closing the chunked body.
    /// Not tied to a writer state.
    pub async fn write_trailers(&mut self, trailers: &Headers) -> Result<(), WriterError> {
        let mut section = trailers.stringify();
        section.push_str("\r\n");
        self.sink.write_all(section.as_bytes()).await?;
        Ok(())
    }
}

/// Headers for a plain, non-chunked response of `content_len` bytes.
pub fn default_headers(content_len: usize) -> Headers {
    let mut headers = Headers::new();
    headers.set("content-length", &content_len.to_string());
    headers.set("connection", "close");
    headers.set("content-type", "text/plain");
    headers
}
