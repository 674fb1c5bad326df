// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fmt, fs, path::Path, time::Duration};
use tracing::debug;
use url::Url;

use crate::error::ProtocolError;

pub const ENV_ENDPOINT: &str = "DISLO_ENDPOINT";
pub const ENV_API_KEY: &str = "DISLO_API_KEY";
pub const ENV_API_SECRET: &str = "DISLO_API_SECRET";
pub const ENV_TIMEOUT_SECS: &str = "DISLO_TIMEOUT_SECS";

/// Shared HMAC secret. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiSecret(Vec<u8>);

impl ApiSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ApiSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiSecret([REDACTED; {} bytes])", self.0.len())
    }
}

/// Endpoint and key material for one client. Immutable once built.
#[derive(Debug, Clone)]
pub struct Credentials {
    endpoint: Url,
    api_key: String,
    api_secret: ApiSecret,
}

impl Credentials {
    /// `endpoint` must be an absolute URL with a host, e.g. `https://api.example.com`.
    /// A path prefix (`https://host/api`) is kept and signed.
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        api_secret: impl Into<Vec<u8>>,
    ) -> std::result::Result<Self, ProtocolError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ProtocolError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() || endpoint.host_str().is_none() {
            return Err(ProtocolError::InvalidEndpoint(format!(
                "{} has no host",
                endpoint
            )));
        }
        Ok(Self {
            endpoint,
            api_key: api_key.into(),
            api_secret: ApiSecret::new(api_secret),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_secret(&self) -> &ApiSecret {
        &self.api_secret
    }
}

/// Client settings as read from YAML and the environment.
///
/// Every field is optional here so that a partial YAML file can be completed
/// by environment variables; [`ClientConfig::credentials`] enforces presence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Request timeout for the HTTP transport.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ClientConfig {
    /// Read a YAML config file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let cfg: ClientConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        debug!(path = %path.display(), "loaded config file");
        Ok(cfg)
    }

    /// YAML file (if given), then `DISLO_*` environment variables on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => Self::from_yaml_file(p)?,
            None => Self::default(),
        };
        base.overlay(|name| env::var(name).ok())
    }

    /// Replace fields with values from `lookup`, keyed by the `DISLO_*` names.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_ENDPOINT) {
            self.endpoint = Some(v);
        }
        if let Some(v) = lookup(ENV_API_KEY) {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup(ENV_API_SECRET) {
            self.api_secret = Some(v);
        }
        if let Some(v) = lookup(ENV_TIMEOUT_SECS) {
            let secs = v
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{} must be a whole number of seconds", ENV_TIMEOUT_SECS))?;
            self.timeout_secs = Some(secs);
        }
        Ok(self)
    }

    pub fn credentials(&self) -> Result<Credentials> {
        let endpoint = self
            .endpoint
            .as_deref()
            .with_context(|| format!("missing endpoint (set {})", ENV_ENDPOINT))?;
        let api_key = self
            .api_key
            .as_deref()
            .with_context(|| format!("missing api_key (set {})", ENV_API_KEY))?;
        let api_secret = self
            .api_secret
            .as_deref()
            .with_context(|| format!("missing api_secret (set {})", ENV_API_SECRET))?;
        Ok(Credentials::new(endpoint, api_key, api_secret.as_bytes())?)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}
