// src/transport/mock.rs

use async_trait::async_trait;
use std::sync::Mutex;

use super::{HttpRequest, Transport};
use crate::config::ApiSecret;
use crate::error::TransportError;
use crate::signer::{self, HEADER_ALGORITHM, HEADER_SIGNATURE, HEADER_TIMESTAMP};

type Responder = Box<dyn Fn(&HttpRequest) -> Result<Vec<u8>, TransportError> + Send + Sync>;

/// Records every request and answers from a closure.
pub(crate) struct MockTransport {
    responder: Responder,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<Vec<u8>, TransportError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with the same raw bytes.
    pub(crate) fn replying(raw: Vec<u8>) -> Self {
        Self::new(move |_| Ok(raw.clone()))
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn last_request(&self) -> HttpRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<Vec<u8>, TransportError> {
        let out = (self.responder)(&request);
        self.requests.lock().unwrap().push(request);
        out
    }
}

/// A raw response signed the way the export server signs it.
pub(crate) fn signed_response(body: &[u8], timestamp: i64, secret: &ApiSecret) -> Vec<u8> {
    let signature = signer::sign_response(body, timestamp, secret);
    let timestamp = timestamp.to_string();
    raw_response(
        &[
            ("Content-Type", "text/csv"),
            (HEADER_ALGORITHM, signer::SIGNATURE_ALGORITHM),
            (HEADER_TIMESTAMP, timestamp.as_str()),
            (HEADER_SIGNATURE, signature.as_str()),
        ],
        body,
    )
}

pub(crate) fn raw_response(headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut raw = b"HTTP/1.1 200 OK\r\n".to_vec();
    for (k, v) in headers {
        raw.extend_from_slice(format!("{}: {}\r\n", k, v).as_bytes());
    }
    raw.extend_from_slice(b"\r\n");
    raw.extend_from_slice(body);
    raw
}
