use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Anything that went wrong while producing or checking a signed exchange.
/// A protocol error means the response must not be trusted at all.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("response signature algorithm \"{received}\" does not match request algorithm sha512")]
    AlgorithmMismatch { received: String },

    #[error("response is missing the {0} header")]
    MissingHeader(&'static str),

    #[error("response timestamp \"{0}\" is not an integer")]
    MalformedTimestamp(String),

    #[error("response signature does not match expected signature")]
    SignatureMismatch,

    #[error("response timestamp {timestamp} is out of bounds, expected {lowest} to {highest}")]
    TimestampOutOfWindow {
        timestamp: i64,
        lowest: i64,
        highest: i64,
    },

    #[error("response has no blank line between headers and body")]
    MissingHeaderBoundary,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure inside the transport collaborator. Opaque to the protocol layer.
#[derive(Debug)]
pub struct TransportError {
    message: String,
    source: Option<BoxError>,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.message)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::with_source(err.to_string(), err)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("encoding request body: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("decoding JSON response body: {0}")]
    Decode(#[source] serde_json::Error),
}

impl Error {
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    pub fn as_protocol(&self) -> Option<&ProtocolError> {
        match self {
            Error::Protocol(p) => Some(p),
            _ => None,
        }
    }
}
