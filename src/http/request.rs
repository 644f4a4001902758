use crate::http::HttpMethod;
use crate::http::headers::Headers;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: HttpMethod,
    pub target: String,
    /// Version with the `HTTP/` prefix stripped, e.g. `"1.1"`.
    pub version: String,
}

/// A fully parsed request, handed to a [`Handler`](crate::handler::Handler)
/// only once the parser reached its final state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub request_line: RequestLine,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Request {
    pub fn method(&self) -> HttpMethod {
        self.request_line.method
    }

    pub fn target(&self) -> &str {
        &self.request_line.target
    }

    pub fn version(&self) -> &str {
        &self.request_line.version
    }
}
