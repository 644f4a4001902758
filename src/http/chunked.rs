//! Chunked transfer-coding helpers.
//!
//! A chunk on the wire is `<hex-size>\r\n<payload>\r\n`; the body ends with a
//! zero-size chunk `0\r\n`, optional trailer fields and a blank line.

use crate::http::{CRLF, find_crlf};

/// Terminating chunk, written before the trailer section.
pub const LAST_CHUNK: &[u8] = b"0\r\n";

/// Frames `payload` as a single chunk.
pub fn encode_chunk(payload: &[u8]) -> Vec<u8> {
    let mut chunk = format!("{:x}\r\n", payload.len()).into_bytes();
    chunk.reserve(payload.len() + CRLF.len());
    chunk.extend_from_slice(payload);
    chunk.extend_from_slice(CRLF);
    chunk
}

/// Reads the size line at the front of `data`.
///
/// Returns the declared payload size and the length of the size line,
/// terminator included. Chunk extensions (`;name=value`) are ignored.
/// `None` if there is no complete size line or it is not valid hex.
pub fn decode_chunk_size(data: &[u8]) -> Option<(usize, usize)> {
    let end = find_crlf(data)?;
    let line = std::str::from_utf8(&data[..end]).ok()?;
    let size = line.split(';').next()?.trim();
    if size.is_empty() || !size.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let size = usize::from_str_radix(size, 16).ok()?;
    Some((size, end + CRLF.len()))
}
