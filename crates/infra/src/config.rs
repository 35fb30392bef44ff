//! Backend selection and construction.
//!
//! Read from the environment:
//! - `WHOLESALE_API_URL`: backend base URL. Absent means the seeded in-memory backend.
//! - `WHOLESALE_BACKEND`: `rest` (default when a URL is set) or `hosted`.
//! - `WHOLESALE_API_KEY`: project key, required by `hosted`.
//! - `WHOLESALE_HTTP_TIMEOUT_SECS`: request timeout, default 10.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::backend::{
    AuthBackend, BackendError, HostedBackend, InMemoryBackend, RestBackend, TenantBackend,
};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown backend kind '{0}' (expected rest or hosted)")]
    UnknownBackend(String),

    #[error("{var} is not valid: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("{0} must be set for this backend")]
    Missing(&'static str),
}

/// Settings shared by the HTTP backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Seeded development backend living in this process.
    InMemory,
    Rest(HttpBackendConfig),
    Hosted(HttpBackendConfig),
}

/// The two ports, usually served by the same object.
#[derive(Clone)]
pub struct Backends {
    pub auth: Arc<dyn AuthBackend>,
    pub tenants: Arc<dyn TenantBackend>,
}

impl BackendConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let Some(base_url) = var("WHOLESALE_API_URL") else {
            return Ok(BackendConfig::InMemory);
        };

        let timeout = match var("WHOLESALE_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                var: "WHOLESALE_HTTP_TIMEOUT_SECS",
                reason: e.to_string(),
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let http = HttpBackendConfig {
            base_url,
            api_key: var("WHOLESALE_API_KEY"),
            timeout: Duration::from_secs(timeout),
        };

        match var("WHOLESALE_BACKEND").as_deref().unwrap_or("rest") {
            "rest" => Ok(BackendConfig::Rest(http)),
            "hosted" => {
                if http.api_key.is_none() {
                    return Err(ConfigError::Missing("WHOLESALE_API_KEY"));
                }
                Ok(BackendConfig::Hosted(http))
            }
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::InMemory => "in-memory",
            BackendConfig::Rest(_) => "rest",
            BackendConfig::Hosted(_) => "hosted",
        }
    }

    /// Construct the configured backend.
    pub fn build(&self) -> Result<Backends, BackendError> {
        let backends = match self {
            BackendConfig::InMemory => {
                let backend = Arc::new(InMemoryBackend::seeded());
                Backends {
                    auth: backend.clone(),
                    tenants: backend,
                }
            }
            BackendConfig::Rest(http) => {
                let backend = Arc::new(RestBackend::new(http)?);
                Backends {
                    auth: backend.clone(),
                    tenants: backend,
                }
            }
            BackendConfig::Hosted(http) => {
                let backend = Arc::new(HostedBackend::new(http)?);
                Backends {
                    auth: backend.clone(),
                    tenants: backend,
                }
            }
        };
        tracing::info!(backend = self.kind(), "backend configured");
        Ok(backends)
    }
}
