//! HTTP field collection for [`Request`](crate::http::request::Request) headers,
//! response headers and chunked trailers.
//!
//! Field names are validated against the token character set and stored
//! lower-cased. Re-adding a name that is already present appends the new value
//! to the existing one (`"a, b"`), which is how HTTP combines list-valued fields.
//!
//! [`Headers::parse`] consumes at most one line per call and never reads past
//! the line terminator, so the caller (usually the
//! [`RequestParser`](crate::http::parser::RequestParser)) can hand it an
//! arbitrarily fragmented buffer and retry once more bytes arrive.

use indexmap::IndexMap;
use thiserror::Error;

use crate::http::{CRLF, find_crlf};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("invalid header line: {0:?}")]
    InvalidHeaderLine(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: IndexMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self {
            fields: IndexMap::new(),
        }
    }

    /// Parses a single field line from the front of `data`.
    ///
    /// Returns the number of bytes consumed and whether the blank line ending
    /// the field section was reached. `(0, false)` means no full line is
    /// buffered yet. On error nothing is consumed and the collection is left
    /// untouched.
    pub fn parse(&mut self, data: &[u8]) -> Result<(usize, bool), HeaderError> {
        let Some(end) = find_crlf(data) else {
            return Ok((0, false));
        };

        if end == 0 {
            return Ok((CRLF.len(), true));
        }

        let line = &data[..end];
        let invalid = || HeaderError::InvalidHeaderLine(String::from_utf8_lossy(line).into_owned());

        let colon = line.iter().position(|&b| b == b':').ok_or_else(invalid)?;
        let (name, value) = (&line[..colon], &line[colon + 1..]);

        // "Host : value" is rejected, leading whitespace is not
        if name.last() == Some(&b' ') {
            return Err(invalid());
        }

        let name = name.trim_ascii();
        if name.is_empty() || !name.iter().all(|&b| is_token_char(b)) {
            return Err(invalid());
        }

        let value = field_value(value.trim_ascii());
        let name = String::from_utf8_lossy(name).to_ascii_lowercase();
        self.append(&name, &value);

        Ok((end + CRLF.len(), false))
    }

    /// Looks up a field by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name.to_ascii_lowercase().as_str())
            .map(String::as_str)
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, name: &str, value: &str) {
        self.fields
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    /// Adds a field, joining it to an existing value with `", "`.
    pub fn append(&mut self, name: &str, value: &str) {
        match self.fields.get_mut(name.to_ascii_lowercase().as_str()) {
            Some(existing) => {
                existing.push_str(", ");
                existing.push_str(value);
            }
            None => {
                self.fields
                    .insert(name.to_ascii_lowercase(), value.to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serializes every field as `name: value\r\n`, without the blank
    /// terminator line.
    pub fn stringify(&self) -> String {
        let mut result = String::new();
        for (name, value) in &self.fields {
            result.push_str(&format!("{}: {}\r\n", name, value));
        }
        result
    }
}

/// Field values are opaque bytes. Anything that is not UTF-8 is read as
/// ISO-8859-1 so every byte survives as one char.
fn field_value(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(value) => value.to_string(),
        Err(_) => raw.iter().map(|&b| char::from(b)).collect(),
    }
}

/// `tchar` from RFC 9110: letters, digits and ``!#$%&'*+-.^_`|~``.
fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_header() {
        let mut headers = Headers::new();
        let (n, done) = headers.parse(b"Host: localhost:42069\r\n\r\n").unwrap();

        assert_eq!(headers.get("host"), Some("localhost:42069"));
        assert_eq!(n, 23);
        assert!(!done);
    }

    #[test]
    fn trims_value_whitespace() {
        let mut headers = Headers::new();
        let (n, done) = headers
            .parse(b"Content-Type:    application/json   \r\n")
            .unwrap();

        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(n, 38);
        assert!(!done);
    }

    #[test]
    fn leading_whitespace_before_name_is_allowed() {
        let mut headers = Headers::new();
        let (n, _) = headers.parse(b"       Host: localhost\r\n").unwrap();

        assert_eq!(n, 24);
        assert_eq!(headers.get("host"), Some("localhost"));
    }

    #[test]
    fn keeps_non_utf8_values() {
        let mut headers = Headers::new();
        let (n, done) = headers.parse(b"X-Name: caf\xe9 \r\n").unwrap();

        assert_eq!(n, 15);
        assert!(!done);
        assert_eq!(headers.get("x-name"), Some("caf\u{e9}"));

        headers.parse("X-Name: café\r\n".as_bytes()).unwrap();
        assert_eq!(headers.get("x-name"), Some("caf\u{e9}, café"));
    }

    #[test]
    fn keeps_existing_fields() {
        let mut headers = Headers::new();
        headers.set("existing-header", "existing-value");

        let (n1, _) = headers.parse(b"Host: localhost:8080\r\n").unwrap();
        let (n2, _) = headers.parse(b"Content-Type: text/html\r\n").unwrap();

        assert_eq!(n1, 22);
        assert_eq!(n2, 25);
        assert_eq!(headers.get("existing-header"), Some("existing-value"));
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn blank_line_ends_section() {
        let mut headers = Headers::new();
        let (n, done) = headers.parse(b"\r\nSome body content here").unwrap();

        assert_eq!(n, 2);
        assert!(done);
        assert!(headers.is_empty());
    }

    #[test]
    fn rejects_space_before_colon() {
        let mut headers = Headers::new();
        let err = headers.parse(b"Host : x\r\n\r\n").unwrap_err();

        assert!(matches!(err, HeaderError::InvalidHeaderLine(_)));
        assert!(err.to_string().contains("invalid header"));
        assert!(headers.is_empty());
    }

    #[test]
    fn partial_line_consumes_nothing() {
        let mut headers = Headers::new();
        assert_eq!(headers.parse(b"Host: localhost").unwrap(), (0, false));
        assert!(headers.is_empty());
    }

    #[test]
    fn rejects_invalid_name_characters() {
        let mut headers = Headers::new();
        assert!(headers.parse("H©st: localhost:42069\r\n\r\n".as_bytes()).is_err());
        assert!(headers.parse(b"Bad Name: x\r\n").is_err());
        assert!(headers.parse(b"   : x\r\n").is_err());
        assert!(headers.parse(b"no-colon-here\r\n").is_err());
        assert!(headers.is_empty());
    }

    #[test]
    fn duplicate_names_are_combined() {
        let mut headers = Headers::new();

        let (n, _) = headers.parse(b"Set-Person: Zack\r\n").unwrap();
        assert_eq!(n, 18);
        assert_eq!(headers.get("set-person"), Some("Zack"));

        let (n, _) = headers.parse(b"Set-Person: Jimmy\r\n").unwrap();
        assert_eq!(n, 19);
        assert_eq!(headers.get("Set-Person"), Some("Zack, Jimmy"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn fragmentation_does_not_change_result() {
        let raw = b"Host: example.com\r\nAccept: */*\r\nX-Tag: a\r\nx-tag: b\r\n\r\n";

        let mut whole = Headers::new();
        let mut offset = 0;
        loop {
            let (n, done) = whole.parse(&raw[offset..]).unwrap();
            offset += n;
            if done {
                break;
            }
        }

        for split in 1..raw.len() {
            let mut headers = Headers::new();
            let mut buffered: Vec<u8> = Vec::new();
            let mut done = false;
            for part in [&raw[..split], &raw[split..]] {
                buffered.extend_from_slice(part);
                loop {
                    let (n, finished) = headers.parse(&buffered).unwrap();
                    buffered.drain(..n);
                    if finished {
                        done = true;
                    }
                    if n == 0 || finished {
                        break;
                    }
                }
            }
            assert!(done, "split at {split}");
            assert_eq!(headers, whole, "split at {split}");
        }
        assert_eq!(whole.get("x-tag"), Some("a, b"));
    }

    #[test]
    fn stringify_emits_field_lines() {
        let mut headers = Headers::new();
        headers.set("Content-Length", "5");
        headers.set("connection", "close");

        assert_eq!(headers.stringify(), "content-length: 5\r\nconnection: close\r\n");
    }
}
