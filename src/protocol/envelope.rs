// src/protocol/envelope.rs

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::trace;

use crate::error::ProtocolError;

/// `Name: value` with a non-empty name.
static HEADER_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^:]+:.*").expect("header line regex is valid"));

const BOUNDARY: &[u8] = b"\r\n\r\n";

/// One response, split into its headers and the body that was signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ResponseEnvelope {
    /// Split at the first `\r\n\r\n`; everything after it is body, verbatim.
    pub fn parse(raw: &[u8]) -> Result<Self, ProtocolError> {
        let pos = raw
            .windows(BOUNDARY.len())
            .position(|w| w == BOUNDARY)
            .ok_or(ProtocolError::MissingHeaderBoundary)?;
        let block = String::from_utf8_lossy(&raw[..pos]);
        Ok(Self {
            headers: parse_headers(&block),
            body: raw[pos + BOUNDARY.len()..].to_vec(),
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// Case-sensitive name → trimmed value. Lines without a colon (the status
/// line among them) are skipped; a repeated name keeps the last value.
pub fn parse_headers(block: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in block.split('\n') {
        if !HEADER_LINE.is_match(line) {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            trace!(name, "response header");
            headers.insert(name.to_string(), value.trim().to_string());
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_first_blank_line() {
        let raw = b"HTTP/1.1 200 OK\r\nX-A: 1\r\n\r\nbody\r\n\r\nmore";
        let env = ResponseEnvelope::parse(raw).unwrap();
        assert_eq!(env.header("X-A"), Some("1"));
        assert_eq!(env.body, b"body\r\n\r\nmore");
    }

    #[test]
    fn missing_boundary_is_a_protocol_error() {
        let err = ResponseEnvelope::parse(b"HTTP/1.1 200 OK\r\nX-A: 1\r\n").unwrap_err();
        assert!(matches!(err, ProtocolError::MissingHeaderBoundary));
    }

    #[test]
    fn empty_body_is_allowed() {
        let env = ResponseEnvelope::parse(b"HTTP/1.1 204 No Content\r\n\r\n").unwrap();
        assert!(env.body.is_empty());
        assert!(env.headers.is_empty());
    }

    #[test]
    fn header_parsing_rules() {
        let headers = parse_headers(
            "HTTP/1.1 200 OK\r\nX-Signature:  abc \r\nno colon here\r\n:novalue\r\nx-signature: lower\r\nX-Dup: 1\r\nX-Dup: 2\r\nX-Url: http://a:b",
        );
        assert_eq!(headers.get("X-Signature").map(String::as_str), Some("abc"));
        // names are case-sensitive
        assert_eq!(headers.get("x-signature").map(String::as_str), Some("lower"));
        assert_eq!(headers.get("X-Dup").map(String::as_str), Some("2"));
        // only the first colon splits
        assert_eq!(headers.get("X-Url").map(String::as_str), Some("http://a:b"));
        assert!(!headers.contains_key(""));
        assert_eq!(headers.len(), 4);
    }
}
