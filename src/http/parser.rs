//! Incremental request parser.
//!
//! [`RequestParser`] is a single-use state machine fed from a growable buffer
//! owned by the caller. Each call to [`RequestParser::parse`] consumes as much
//! of the buffer as the current state allows and reports how many bytes were
//! used; the caller shifts those bytes out and reads more from the network
//! when nothing could be consumed. [`read_request`] implements that loop on
//! top of any `async_std` reader.
//!
//! The accepted grammar is intentionally small:
//! - exactly `METHOD SP TARGET SP HTTP/1.1 CRLF` on the request line,
//! - `GET`, `POST`, `PUT` and `DELETE` only, upper-case,
//! - a body only when `content-length` is present, and then exactly that long.

use async_std::io::{Read, ReadExt};
use std::cmp::Ordering;
use thiserror::Error;

use crate::http::headers::{HeaderError, Headers};
use crate::http::request::{Request, RequestLine};
use crate::http::{CRLF, HTTP_VERSION, HttpMethod, find_crlf};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid request line: {0:?}")]
    InvalidRequestLine(String),

    #[error("unsupported method: {0:?}")]
    InvalidMethod(String),

    #[error("request target must start with '/': {0:?}")]
    InvalidTarget(String),

    #[error("unsupported HTTP version: {0:?}")]
    UnsupportedVersion(String),

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("invalid content-length: {0:?}")]
    InvalidContentLength(String),

    #[error("content-length mismatch: declared {declared}, {available} bytes available")]
    ContentLengthMismatch { declared: usize, available: usize },

    #[error("unexpected end of stream: declared {declared} body bytes, received {received}")]
    UnexpectedEof { declared: usize, received: usize },

    #[error("connection closed before a complete request line")]
    IncompleteRequest,

    #[error("request already parsed")]
    AlreadyParsed,

    #[error("invalid parser transition from {from:?} to {to:?}")]
    InvalidTransition { from: ParserState, to: ParserState },

    #[error("I/O error while reading request: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParserState {
    Initialized,
    ParsingHeaders,
    ParsingBody,
    Done,
}

impl ParserState {
    /// Transition table. Every edge moves forward; `ParsingHeaders -> Done`
    /// is taken when the stream ends before the blank line.
    fn can_transition_to(self, next: ParserState) -> bool {
        use ParserState::*;

        matches!(
            (self, next),
            (Initialized, ParsingHeaders)
                | (ParsingHeaders, ParsingBody)
                | (ParsingHeaders, Done)
                | (ParsingBody, Done)
        )
    }
}

pub struct RequestParser {
    state: ParserState,
    request_line: Option<RequestLine>,
    headers: Headers,
    body: Vec<u8>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Initialized,
            request_line: None,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ParserState::Done
    }

    /// Parses as far as `data` allows and returns the number of bytes used.
    ///
    /// Returns `Ok(0)` when the current state needs more bytes. Calling this
    /// once the request is complete fails with [`ParseError::AlreadyParsed`].
    pub fn parse(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        if self.is_done() {
            return Err(ParseError::AlreadyParsed);
        }

        let mut consumed = 0;
        while !self.is_done() {
            let before = self.state;
            let n = self.parse_single(&data[consumed..])?;
            consumed += n;

            if n == 0 && self.state == before {
                break;
            }
        }

        Ok(consumed)
    }

    fn parse_single(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        match self.state {
            ParserState::Initialized => {
                let Some((request_line, n)) = parse_request_line(data)? else {
                    return Ok(0);
                };
                self.request_line = Some(request_line);
                self.transition(ParserState::ParsingHeaders)?;
                Ok(n)
            }
            ParserState::ParsingHeaders => {
                let (n, done) = self.headers.parse(data)?;
                if done {
                    self.transition(ParserState::ParsingBody)?;
                }
                Ok(n)
            }
            ParserState::ParsingBody => self.parse_body(data),
            ParserState::Done => Err(ParseError::AlreadyParsed),
        }
    }

    fn parse_body(&mut self, data: &[u8]) -> Result<usize, ParseError> {
        let Some(declared) = self.declared_length()? else {
            self.transition(ParserState::Done)?;
            return Ok(0);
        };

        // Exactly one request per connection: anything past the declared
        // length is an error rather than the start of a pipelined request.
        match data.len().cmp(&declared) {
            Ordering::Less => Ok(0),
            Ordering::Greater => Err(ParseError::ContentLengthMismatch {
                declared,
                available: data.len(),
            }),
            Ordering::Equal => {
                self.body.extend_from_slice(data);
                self.transition(ParserState::Done)?;
                Ok(declared)
            }
        }
    }

    fn declared_length(&self) -> Result<Option<usize>, ParseError> {
        self.headers
            .get("content-length")
            .map(|raw| {
                raw.parse::<usize>()
                    .map_err(|_| ParseError::InvalidContentLength(raw.to_string()))
            })
            .transpose()
    }

    fn transition(&mut self, next: ParserState) -> Result<(), ParseError> {
        if !self.state.can_transition_to(next) {
            return Err(ParseError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Tells the parser the source is exhausted with `buffered` bytes still
    /// unconsumed.
    ///
    /// A missing body is an error; a missing blank line after the headers is
    /// not, the request simply ends there.
    pub fn end_of_stream(&mut self, buffered: usize) -> Result<(), ParseError> {
        match self.state {
            ParserState::Initialized => Err(ParseError::IncompleteRequest),
            ParserState::ParsingHeaders => self.transition(ParserState::Done),
            ParserState::ParsingBody => Err(ParseError::UnexpectedEof {
                declared: self.declared_length()?.unwrap_or(0),
                received: buffered,
            }),
            ParserState::Done => Ok(()),
        }
    }

    /// Consumes the parser, returning the request if parsing completed.
    pub fn into_request(self) -> Result<Request, ParseError> {
        match (self.state, self.request_line) {
            (ParserState::Done, Some(request_line)) => Ok(Request {
                request_line,
                headers: self.headers,
                body: self.body,
            }),
            _ => Err(ParseError::IncompleteRequest),
        }
    }
}

/// Parses the request line at the front of `data`, returning it with the
/// number of bytes it occupied (terminator included), or `None` if the
/// terminator has not arrived yet.
fn parse_request_line(data: &[u8]) -> Result<Option<(RequestLine, usize)>, ParseError> {
    let Some(end) = find_crlf(data) else {
        return Ok(None);
    };

    let line = std::str::from_utf8(&data[..end])
        .map_err(|_| ParseError::InvalidRequestLine(String::from_utf8_lossy(&data[..end]).into_owned()))?;

    let parts: Vec<&str> = line.split(' ').collect();
    let [method, target, version] = parts.as_slice() else {
        return Err(ParseError::InvalidRequestLine(line.to_string()));
    };

    let version = match version.strip_prefix("HTTP/") {
        Some(v) if v == HTTP_VERSION => v,
        _ => return Err(ParseError::UnsupportedVersion(version.to_string())),
    };

    let method = method
        .parse::<HttpMethod>()
        .map_err(|_| ParseError::InvalidMethod(method.to_string()))?;

    if !target.starts_with('/') {
        return Err(ParseError::InvalidTarget(target.to_string()));
    }

    let request_line = RequestLine {
        method,
        target: target.to_string(),
        version: version.to_string(),
    };

    Ok(Some((request_line, end + CRLF.len())))
}

/// Reads and parses one request from `reader`.
///
/// The read buffer starts at `initial_capacity` bytes and doubles whenever it
/// fills up before the parser can make progress.
pub async fn read_request<R>(reader: &mut R, initial_capacity: usize) -> Result<Request, ParseError>
where
    R: Read + Unpin + ?Sized,
{
    let mut parser = RequestParser::new();
    let mut buf = vec![0u8; initial_capacity.max(1)];
    let mut read_to = 0;
    let mut eof = false;

    while !parser.is_done() {
        let consumed = parser.parse(&buf[..read_to])?;
        if consumed > 0 {
            buf.copy_within(consumed..read_to, 0);
            read_to -= consumed;
            continue;
        }

        if parser.is_done() {
            break;
        }

        if eof {
            parser.end_of_stream(read_to)?;
            break;
        }

        if read_to == buf.len() {
            buf.resize(buf.len() * 2, 0);
        }

        match reader.read(&mut buf[read_to..]).await {
            Ok(0) => eof = true,
            Ok(n) => read_to += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ParseError::Io(e)),
        }
    }

    parser.into_request()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Hands out at most `per_read` bytes per read call.
    struct ChunkReader {
        data: Vec<u8>,
        per_read: usize,
        pos: usize,
    }

    impl ChunkReader {
        fn new(data: &[u8], per_read: usize) -> Self {
            Self {
                data: data.to_vec(),
                per_read,
                pos: 0,
            }
        }
    }

    impl Read for ChunkReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut [u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            let end = (this.pos + this.per_read).min(this.data.len());
            let n = (end - this.pos).min(buf.len());
            buf[..n].copy_from_slice(&this.data[this.pos..this.pos + n]);
            this.pos += n;
            Poll::Ready(Ok(n))
        }
    }

    async fn parse_chunked(data: &[u8], per_read: usize) -> Result<Request, ParseError> {
        let mut reader = ChunkReader::new(data, per_read);
        read_request(&mut reader, 8).await
    }

    #[async_std::test]
    async fn parses_simple_get() {
        let req = parse_chunked(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n", 3)
            .await
            .unwrap();

        assert_eq!(req.method(), HttpMethod::Get);
        assert_eq!(req.target(), "/");
        assert_eq!(req.version(), "1.1");
        assert_eq!(req.headers.get("host"), Some("x"));
        assert_eq!(req.headers.len(), 1);
        assert!(req.body.is_empty());
    }

    #[async_std::test]
    async fn byte_at_a_time_matches_single_read() {
        let raw = b"GET /coffee HTTP/1.1\r\nHost: localhost:42069\r\nUser-Agent: curl/7.81.0\r\nAccept: */*\r\n\r\n";

        let whole = parse_chunked(raw, raw.len()).await.unwrap();
        let trickled = parse_chunked(raw, 1).await.unwrap();

        assert_eq!(whole, trickled);
        assert_eq!(trickled.target(), "/coffee");
        assert_eq!(trickled.headers.get("user-agent"), Some("curl/7.81.0"));
    }

    #[async_std::test]
    async fn parses_body_with_content_length() {
        let raw = b"POST /a HTTP/1.1\r\ncontent-length: 5\r\n\r\nhello";

        for per_read in [1, 4, raw.len()] {
            let req = parse_chunked(raw, per_read).await.unwrap();
            assert_eq!(req.method(), HttpMethod::Post);
            assert_eq!(req.body, b"hello");
        }
    }

    #[async_std::test]
    async fn zero_content_length_means_empty_body() {
        let req = parse_chunked(b"PUT /x HTTP/1.1\r\nContent-Length: 0\r\n\r\n", 5)
            .await
            .unwrap();
        assert!(req.body.is_empty());
    }

    #[async_std::test]
    async fn short_body_fails_at_end_of_stream() {
        let raw = b"POST /a HTTP/1.1\r\nContent-Length: 10\r\n\r\n123456789";
        let err = parse_chunked(raw, 7).await.unwrap_err();

        assert!(matches!(
            err,
            ParseError::UnexpectedEof {
                declared: 10,
                received: 9
            }
        ));
    }

    #[async_std::test]
    async fn long_body_fails_with_mismatch() {
        let raw = b"POST /a HTTP/1.1\r\nContent-Length: 10\r\n\r\n12345678901";
        let err = parse_chunked(raw, raw.len()).await.unwrap_err();

        assert!(matches!(
            err,
            ParseError::ContentLengthMismatch {
                declared: 10,
                available: 11
            }
        ));
    }

    #[async_std::test]
    async fn rejects_non_numeric_content_length() {
        let raw = b"POST /a HTTP/1.1\r\nContent-Length: ten\r\n\r\n";
        let err = parse_chunked(raw, raw.len()).await.unwrap_err();
        assert!(matches!(err, ParseError::InvalidContentLength(v) if v == "ten"));
    }

    #[async_std::test]
    async fn rejects_bad_request_lines() {
        let cases: [(&[u8], fn(&ParseError) -> bool); 6] = [
            (b"Get / HTTP/1.1\r\n\r\n", |e| matches!(e, ParseError::InvalidMethod(_))),
            (b"PATCH / HTTP/1.1\r\n\r\n", |e| matches!(e, ParseError::InvalidMethod(_))),
            (b"GET coffee HTTP/1.1\r\n\r\n", |e| matches!(e, ParseError::InvalidTarget(_))),
            (b"GET / HTTP/1.0\r\n\r\n", |e| matches!(e, ParseError::UnsupportedVersion(_))),
            (b"GET /  HTTP/1.1\r\n\r\n", |e| matches!(e, ParseError::InvalidRequestLine(_))),
            (b"/coffee HTTP/1.1\r\n\r\n", |e| matches!(e, ParseError::InvalidRequestLine(_))),
        ];

        for (raw, check) in cases {
            let err = parse_chunked(raw, 3).await.unwrap_err();
            assert!(check(&err), "{:?} gave {err:?}", String::from_utf8_lossy(raw));
        }
    }

    #[async_std::test]
    async fn merges_duplicate_request_headers() {
        let raw = b"GET / HTTP/1.1\r\nX-Person: Zack\r\nx-person: Jimmy\r\n\r\n";
        let req = parse_chunked(raw, 2).await.unwrap();
        assert_eq!(req.headers.get("x-person"), Some("Zack, Jimmy"));
    }

    #[async_std::test]
    async fn malformed_header_aborts_parse() {
        let raw = b"GET / HTTP/1.1\r\nHost : x\r\n\r\n";
        let err = parse_chunked(raw, raw.len()).await.unwrap_err();
        assert!(matches!(err, ParseError::Header(HeaderError::InvalidHeaderLine(_))));
    }

    #[async_std::test]
    async fn end_of_stream_in_headers_completes_request() {
        let req = parse_chunked(b"DELETE /item HTTP/1.1\r\nHost: x\r\n", 4)
            .await
            .unwrap();
        assert_eq!(req.method(), HttpMethod::Delete);
        assert_eq!(req.headers.get("host"), Some("x"));
    }

    #[async_std::test]
    async fn empty_stream_is_incomplete() {
        let err = parse_chunked(b"", 4).await.unwrap_err();
        assert!(matches!(err, ParseError::IncompleteRequest));

        let err = parse_chunked(b"GET / HTT", 4).await.unwrap_err();
        assert!(matches!(err, ParseError::IncompleteRequest));
    }

    #[test]
    fn partial_request_line_consumes_nothing() {
        let mut parser = RequestParser::new();

        assert_eq!(parser.parse(b"GET / HT").unwrap(), 0);
        assert_eq!(parser.parse(b"GET / HTTP/1.1\r").unwrap(), 0);
        assert_eq!(parser.state(), ParserState::Initialized);

        assert_eq!(parser.parse(b"GET / HTTP/1.1\r\n").unwrap(), 16);
        assert_eq!(parser.state(), ParserState::ParsingHeaders);
    }

    #[test]
    fn parser_is_single_use() {
        let mut parser = RequestParser::new();
        let raw = b"GET / HTTP/1.1\r\n\r\n";

        assert_eq!(parser.parse(raw).unwrap(), raw.len());
        assert!(parser.is_done());
        assert!(matches!(parser.parse(b""), Err(ParseError::AlreadyParsed)));
    }

    #[test]
    fn body_waits_for_declared_length() {
        let mut parser = RequestParser::new();
        let head = b"POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\n";

        assert_eq!(parser.parse(head).unwrap(), head.len());
        assert_eq!(parser.state(), ParserState::ParsingBody);
        assert_eq!(parser.parse(b"ab").unwrap(), 0);
        assert_eq!(parser.parse(b"abcd").unwrap(), 4);

        let req = parser.into_request().unwrap();
        assert_eq!(req.body, b"abcd");
    }

    #[test]
    fn transitions_only_move_forward() {
        use ParserState::*;

        assert!(Initialized.can_transition_to(ParsingHeaders));
        assert!(ParsingBody.can_transition_to(Done));
        assert!(!ParsingHeaders.can_transition_to(Initialized));
        assert!(!Done.can_transition_to(ParsingBody));
        assert!(!Initialized.can_transition_to(ParsingBody));
    }
}
