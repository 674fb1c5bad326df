// src/transport/mod.rs
//! Byte-level HTTP dispatch. The protocol layer hands over a fully built
//! request and gets back the raw response: status line and headers, a blank
//! line (`\r\n\r\n`), then the body.

use async_trait::async_trait;
use reqwest::Method;
use url::Url;

use crate::error::TransportError;

mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::ReqwestTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends one request. Timeouts, TLS and redirects are the implementor's business.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<Vec<u8>, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<Vec<u8>, TransportError> {
        (**self).send(request).await
    }
}
