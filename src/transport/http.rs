// src/transport/http.rs

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client,
};
use std::time::Duration;
use tracing::debug;

use super::{HttpRequest, Transport};
use crate::error::TransportError;

/// [`Transport`] over a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::with_source(format!("bad header name {}", name), e))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::with_source(format!("bad value for header {}", name), e))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// `x-signature-algorithm` → `X-Signature-Algorithm`. hyper lowercases
/// received names; the signed-response headers are looked up in this form.
fn canonical_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<Vec<u8>, TransportError> {
        let headers = header_map(&request.headers)?;
        let resp = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers)
            .body(request.body)
            .send()
            .await?;

        let status = resp.status();
        debug!(%status, url = %request.url.path(), "response received");

        // rebuild the header block the protocol layer expects
        let mut raw = format!("{:?} {}\r\n", resp.version(), status).into_bytes();
        for (name, value) in resp.headers() {
            raw.extend_from_slice(canonical_name(name.as_str()).as_bytes());
            raw.extend_from_slice(b": ");
            raw.extend_from_slice(value.as_bytes());
            raw.extend_from_slice(b"\r\n");
        }
        raw.extend_from_slice(b"\r\n");
        raw.extend_from_slice(&resp.bytes().await?);
        Ok(raw)
    }
}
