// src/protocol/mod.rs
//! The signed call: serialise parameters, sign, dispatch, verify.

pub mod envelope;

pub use envelope::{parse_headers, ResponseEnvelope};

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::config::Credentials;
use crate::error::{Error, ProtocolError, Result};
use crate::signer::{self, SignedRequest};
use crate::transport::{HttpRequest, Transport};

/// Owns the credentials and performs signed calls through a [`Transport`].
///
/// Holds no per-call state, so one handler can serve concurrent calls as
/// long as the transport can.
pub struct QueryHandler<T, C = SystemClock> {
    credentials: Credentials,
    transport: T,
    clock: C,
}

impl<T: Transport> QueryHandler<T, SystemClock> {
    pub fn new(credentials: Credentials, transport: T) -> Self {
        Self::with_clock(credentials, transport, SystemClock)
    }
}

impl<T: Transport, C: Clock> QueryHandler<T, C> {
    pub fn with_clock(credentials: Credentials, transport: T, clock: C) -> Self {
        Self {
            credentials,
            transport,
            clock,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Endpoint path prefix joined with `path`. This is what gets signed.
    pub fn full_path(&self, path: &str) -> String {
        let prefix = self.credentials.endpoint().path().trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", prefix, path)
        } else {
            format!("{}/{}", prefix, path)
        }
    }

    /// Sign `body` for `path` at the current time.
    pub fn sign(&self, path: &str, body: &[u8]) -> SignedRequest {
        signer::sign_request(
            &self.full_path(path),
            body,
            self.clock.unix_seconds(),
            self.credentials.api_key(),
            self.credentials.api_secret(),
        )
    }

    /// The POST that `call` would dispatch, with a fresh timestamp and signature.
    pub fn build_request<P>(&self, path: &str, parameters: &P) -> Result<HttpRequest>
    where
        P: Serialize + ?Sized,
    {
        let body = serde_json::to_vec(parameters).map_err(Error::Encode)?;
        let signed = self.sign(path, &body);
        let endpoint = self.credentials.endpoint();
        let raw_url = format!(
            "{}{}",
            endpoint.origin().ascii_serialization(),
            signed.path_and_query()
        );
        let url = Url::parse(&raw_url)
            .map_err(|e| ProtocolError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        // URL normalisation must not alter what was signed
        let sent = match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        };
        if url.fragment().is_some()
            || url.path() != signed.path
            || sent != signed.path_and_query()
        {
            return Err(ProtocolError::InvalidEndpoint(format!(
                "path {:?} is not sent as signed",
                signed.path
            ))
            .into());
        }
        debug!(path = %signed.path, body_len = body.len(), "built signed request");

        Ok(HttpRequest {
            method: Method::POST,
            url,
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Content-Length".to_string(), body.len().to_string()),
            ],
            body: signed.body,
        })
    }

    /// Perform one signed call and return the verified response body.
    ///
    /// Fails on transport errors and on any verification failure; nothing is
    /// retried and no part of an unverified body is returned.
    #[instrument(level = "debug", skip(self, parameters))]
    pub async fn call<P>(&self, path: &str, parameters: &P) -> Result<Vec<u8>>
    where
        P: Serialize + ?Sized + Sync,
    {
        let request = self.build_request(path, parameters)?;
        let raw = self.transport.send(request).await?;

        let envelope = ResponseEnvelope::parse(&raw)?;
        signer::verify_response(
            &envelope.headers,
            &envelope.body,
            self.credentials.api_secret(),
            self.clock.unix_seconds(),
        )?;

        info!(path, bytes = envelope.body.len(), "verified response");
        Ok(envelope.body)
    }

    /// [`call`](Self::call), then parse the verified body as JSON.
    pub async fn call_json<P, R>(&self, path: &str, parameters: &P) -> Result<R>
    where
        P: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let body = self.call(path, parameters).await?;
        serde_json::from_slice(&body).map_err(Error::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::TransportError;
    use crate::signer::{HEADER_ALGORITHM, HEADER_SIGNATURE, HEADER_TIMESTAMP};
    use crate::transport::mock::{raw_response, signed_response, MockTransport};
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn creds(endpoint: &str) -> Credentials {
        Credentials::new(endpoint, "key-1", "s3cret").unwrap()
    }

    fn handler(endpoint: &str, transport: MockTransport) -> QueryHandler<MockTransport, FixedClock> {
        QueryHandler::with_clock(creds(endpoint), transport, FixedClock::from_unix(NOW))
    }

    #[test]
    fn request_is_signed_post_with_json_headers() {
        let h = handler("https://api.example.com", MockTransport::replying(vec![]));
        let req = h.build_request("/export/v2/query", &json!({"a": 1})).unwrap();

        assert_eq!(req.method, Method::POST);
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.header("Content-Length"), Some("7"));
        assert_eq!(req.body, br#"{"a":1}"#);

        let unsigned = format!(
            "/export/v2/query?timestamp={}&api_key=key-1&signature_algorithm=sha512",
            NOW
        );
        let sig = signer::hmac_hex(
            h.credentials().api_secret(),
            &[unsigned.as_bytes(), req.body.as_slice()],
        );
        assert_eq!(
            req.url.as_str(),
            format!("https://api.example.com{}&signature={}", unsigned, sig)
        );
    }

    #[test]
    fn endpoint_prefix_is_signed_once() {
        let h = handler("https://api.example.com/v1/", MockTransport::replying(vec![]));
        assert_eq!(h.full_path("/export/v2/query"), "/v1/export/v2/query");
        assert_eq!(h.full_path("export/v2/query"), "/v1/export/v2/query");

        let req = h.build_request("/export/v2/query", &json!({})).unwrap();
        assert_eq!(req.url.path(), "/v1/export/v2/query");
        assert!(req
            .url
            .query()
            .unwrap()
            .starts_with(&format!("timestamp={}&api_key=key-1", NOW)));
    }

    #[test]
    fn port_is_kept() {
        let h = handler("http://127.0.0.1:8080", MockTransport::replying(vec![]));
        let req = h.build_request("/x", &json!({})).unwrap();
        assert_eq!(req.url.port(), Some(8080));
    }

    #[tokio::test]
    async fn call_returns_verified_body() {
        let secret = creds("https://api.example.com").api_secret().clone();
        let raw = signed_response(b"a,b\n1,2\n", NOW - 5, &secret);
        let h = handler("https://api.example.com", MockTransport::replying(raw));

        let body = h.call("/export/v2/query", &json!({})).await.unwrap();
        assert_eq!(body, b"a,b\n1,2\n");
        assert_eq!(h.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn stale_response_is_rejected() {
        let secret = creds("https://api.example.com").api_secret().clone();
        let raw = signed_response(b"a\n1\n", NOW - 301, &secret);
        let h = handler("https://api.example.com", MockTransport::replying(raw));

        let err = h.call("/p", &json!({})).await.unwrap_err();
        assert!(matches!(
            err.as_protocol(),
            Some(ProtocolError::TimestampOutOfWindow { .. })
        ));
    }

    #[tokio::test]
    async fn wrong_algorithm_is_rejected() {
        let raw = raw_response(
            &[
                (HEADER_ALGORITHM, "sha1"),
                (HEADER_TIMESTAMP, "1700000000"),
                (HEADER_SIGNATURE, "00"),
            ],
            b"a\n1\n",
        );
        let h = handler("https://api.example.com", MockTransport::replying(raw));
        let err = h.call("/p", &json!({})).await.unwrap_err();
        assert!(matches!(
            err.as_protocol(),
            Some(ProtocolError::AlgorithmMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn response_signed_with_other_secret_is_rejected() {
        let other = crate::config::ApiSecret::new(b"not-the-secret".to_vec());
        let raw = signed_response(b"a\n1\n", NOW, &other);
        let h = handler("https://api.example.com", MockTransport::replying(raw));
        let err = h.call("/p", &json!({})).await.unwrap_err();
        assert!(matches!(
            err.as_protocol(),
            Some(ProtocolError::SignatureMismatch)
        ));
    }

    #[tokio::test]
    async fn missing_boundary_is_rejected() {
        let h = handler(
            "https://api.example.com",
            MockTransport::replying(b"HTTP/1.1 200 OK\r\nX-Signature: 00".to_vec()),
        );
        let err = h.call("/p", &json!({})).await.unwrap_err();
        assert!(matches!(
            err.as_protocol(),
            Some(ProtocolError::MissingHeaderBoundary)
        ));
    }

    #[tokio::test]
    async fn transport_failure_passes_through() {
        let h = handler(
            "https://api.example.com",
            MockTransport::new(|_| Err(TransportError::new("connection reset"))),
        );
        let err = h.call("/p", &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!err.is_protocol());
    }

    #[tokio::test]
    async fn each_call_signs_afresh() {
        let secret = creds("https://api.example.com").api_secret().clone();
        let raw = signed_response(b"a\n1\n", NOW, &secret);
        let h = handler("https://api.example.com", MockTransport::replying(raw));

        h.call("/p", &json!({"n": 1})).await.unwrap();
        h.call("/p", &json!({"n": 2})).await.unwrap();
        let reqs = h.transport().requests();
        assert_eq!(reqs.len(), 2);
        assert_ne!(reqs[0].url, reqs[1].url);
    }

    #[tokio::test]
    async fn call_json_decodes_verified_body() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Status {
            ok: bool,
        }

        let secret = creds("https://api.example.com").api_secret().clone();
        let raw = signed_response(br#"{"ok":true}"#, NOW, &secret);
        let h = handler("https://api.example.com", MockTransport::replying(raw));
        let status: Status = h.call_json("/status", &json!({})).await.unwrap();
        assert_eq!(status, Status { ok: true });

        let raw = signed_response(b"not json", NOW, &secret);
        let h = handler("https://api.example.com", MockTransport::replying(raw));
        let err = h.call_json::<_, Status>("/status", &json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn path_that_url_would_rewrite_is_rejected() {
        let h = handler("https://api.example.com", MockTransport::replying(vec![]));
        for path in ["/export/v2/report/a b", "/export/v2/report/7#x", "/r/1?x=1", "/a/../query"] {
            let err = h.build_request(path, &json!({})).unwrap_err();
            assert!(
                matches!(err.as_protocol(), Some(ProtocolError::InvalidEndpoint(_))),
                "{}: {:?}",
                path,
                err
            );
        }
        assert!(h.build_request("/export/v2/report/a%20b", &json!({})).is_ok());
    }

    #[tokio::test]
    async fn rejected_path_never_reaches_transport() {
        let h = handler("https://api.example.com", MockTransport::replying(vec![]));
        assert!(h.call("/r/7#x", &json!({})).await.is_err());
        assert!(h.transport().requests().is_empty());
    }
}
