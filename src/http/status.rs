#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);

    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Reason phrase for the codes this server emits on purpose. Other codes
    /// go out without one.
    pub fn reason(&self) -> Option<&'static str> {
        match self.0 {
            200 => Some("OK"),
            400 => Some("Bad Request"),
            500 => Some("Internal Server Error"),
            _ => None,
        }
    }

    pub fn status_line(&self) -> String {
        match self.reason() {
            Some(reason) => format!("HTTP/1.1 {} {}\r\n", self.0, reason),
            None => format!("HTTP/1.1 {}\r\n", self.0),
        }
    }
}
