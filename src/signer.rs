//! HMAC-SHA512 request signing and response verification.
//!
//! Request signing string: `path?timestamp=..&api_key=..&signature_algorithm=sha512` + body.
//! Response signing string: body + `"\n\n"` + timestamp + `"\n"` + algorithm.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::collections::HashMap;
use tracing::{trace, warn};

use crate::config::ApiSecret;
use crate::error::ProtocolError;

type HmacSha512 = Hmac<Sha512>;

pub const SIGNATURE_ALGORITHM: &str = "sha512";

/// Accepted clock skew either side of "now", inclusive.
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

pub const HEADER_ALGORITHM: &str = "X-Signature-Algorithm";
pub const HEADER_TIMESTAMP: &str = "X-Signature-Timestamp";
pub const HEADER_SIGNATURE: &str = "X-Signature";

/// A path plus its ordered, signed query parameters and the exact body that was signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl SignedRequest {
    /// `path?k=v&k=v...` in signing order, signature last.
    pub fn path_and_query(&self) -> String {
        let mut out = self.path.clone();
        for (i, (k, v)) in self.query.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
        out
    }

    pub fn signature(&self) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == "signature")
            .map(|(_, v)| v.as_str())
    }
}

fn mac_for(secret: &ApiSecret) -> HmacSha512 {
    HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length")
}

/// Lowercase hex HMAC-SHA512 over the concatenation of `parts`.
pub fn hmac_hex(secret: &ApiSecret, parts: &[&[u8]]) -> String {
    let mut mac = mac_for(secret);
    for part in parts {
        mac.update(part);
    }
    hex::encode(mac.finalize().into_bytes())
}

/// Build the signed path for one call. The signature covers every query
/// parameter before it plus the raw body, so it is appended last.
pub fn sign_request(
    path: &str,
    body: &[u8],
    timestamp: i64,
    api_key: &str,
    secret: &ApiSecret,
) -> SignedRequest {
    let mut req = SignedRequest {
        path: path.to_string(),
        query: vec![
            ("timestamp".to_string(), timestamp.to_string()),
            ("api_key".to_string(), api_key.to_string()),
            (
                "signature_algorithm".to_string(),
                SIGNATURE_ALGORITHM.to_string(),
            ),
        ],
        body: body.to_vec(),
    };
    let unsigned = req.path_and_query();
    let signature = hmac_hex(secret, &[unsigned.as_bytes(), body]);
    trace!(path = %unsigned, body_len = body.len(), "signed request");
    req.query.push(("signature".to_string(), signature));
    req
}

/// Everything after the body in the response signing string.
fn response_trailer(timestamp: i64) -> String {
    format!("\n\n{}\n{}", timestamp, SIGNATURE_ALGORITHM)
}

/// What the server sends in `X-Signature` for `body` at `timestamp`.
pub fn sign_response(body: &[u8], timestamp: i64, secret: &ApiSecret) -> String {
    hmac_hex(secret, &[body, response_trailer(timestamp).as_bytes()])
}

/// Check algorithm, signature and freshness of a response, in that order.
/// Pure in (headers, body, secret, now).
pub fn verify_response(
    headers: &HashMap<String, String>,
    body: &[u8],
    secret: &ApiSecret,
    now: i64,
) -> Result<(), ProtocolError> {
    let algorithm = headers
        .get(HEADER_ALGORITHM)
        .map(String::as_str)
        .unwrap_or("");
    if algorithm != SIGNATURE_ALGORITHM {
        warn!(received = %algorithm, "response signature algorithm mismatch");
        return Err(ProtocolError::AlgorithmMismatch {
            received: algorithm.to_string(),
        });
    }

    let raw_ts = headers
        .get(HEADER_TIMESTAMP)
        .ok_or(ProtocolError::MissingHeader(HEADER_TIMESTAMP))?;
    let timestamp: i64 = raw_ts
        .trim()
        .parse()
        .map_err(|_| ProtocolError::MalformedTimestamp(raw_ts.clone()))?;

    let received = headers
        .get(HEADER_SIGNATURE)
        .ok_or(ProtocolError::MissingHeader(HEADER_SIGNATURE))?;
    let received = hex::decode(received.trim()).map_err(|_| {
        warn!("response signature is not valid hex");
        ProtocolError::SignatureMismatch
    })?;

    let mut mac = mac_for(secret);
    mac.update(body);
    mac.update(response_trailer(timestamp).as_bytes());
    if mac.verify_slice(&received).is_err() {
        warn!(timestamp, body_len = body.len(), "response signature mismatch");
        return Err(ProtocolError::SignatureMismatch);
    }

    let lowest = now.saturating_sub(TIMESTAMP_TOLERANCE_SECS);
    let highest = lowest.saturating_add(2 * TIMESTAMP_TOLERANCE_SECS);
    if timestamp < lowest || timestamp > highest {
        warn!(timestamp, lowest, highest, "response timestamp outside window");
        return Err(ProtocolError::TimestampOutOfWindow {
            timestamp,
            lowest,
            highest,
        });
    }

    Ok(())
}
