//! Client configuration.

use crate::error::{ClientError, ClientResult};
use std::fmt;
use std::time::Duration;

/// Production API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.dinero.dk";

/// Production OAuth2 token endpoint.
pub const DEFAULT_AUTH_URL: &str = "https://authz.dinero.dk/dineroapi/oauth/token";

/// Environment variables that must be set for [`ClientConfig::from_env`].
pub const REQUIRED_ENV_VARS: [&str; 4] = ["CLIENT_ID", "CLIENT_SECRET", "API_KEY", "ORG_ID"];

/// Credentials and endpoints of the accounting API.
#[derive(Clone)]
pub struct ClientConfig {
    /// OAuth2 client id.
    pub client_id: String,
    /// OAuth2 client secret.
    pub client_secret: String,
    /// Organization API key, used as username and password of the grant.
    pub api_key: String,
    /// Organization id substituted into endpoint paths.
    pub organization_id: String,
    /// API base URL.
    pub base_url: String,
    /// Token endpoint.
    pub auth_url: String,
    /// Timeout of every request.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration for the production endpoints.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        api_key: impl Into<String>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_key: api_key.into(),
            organization_id: organization_id.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// Empty values count as missing. The error names every missing variable.
    pub fn from_lookup<F>(lookup: F) -> ClientResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let values: Vec<Option<String>> = REQUIRED_ENV_VARS
            .iter()
            .map(|key| lookup(key).filter(|value| !value.trim().is_empty()))
            .collect();

        let missing: Vec<&'static str> = REQUIRED_ENV_VARS
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| *key)
            .collect();
        if !missing.is_empty() {
            return Err(ClientError::MissingEnv(missing));
        }

        let mut values = values.into_iter().flatten();
        let mut next = || values.next().unwrap_or_default();
        Ok(Self::new(next(), next(), next(), next()))
    }

    /// Sets the API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the token endpoint.
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_key", &"<redacted>")
            .field("organization_id", &self.organization_id)
            .field("base_url", &self.base_url)
            .field("auth_url", &self.auth_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}
