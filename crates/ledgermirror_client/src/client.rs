//! `reqwest`-backed implementation of the engine's HTTP seam.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use ledgermirror_engine::{HttpClient, HttpRequest, HttpResponse, HttpTransport};
use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// Blocking HTTP client holding a lazily obtained access token.
pub struct ReqwestClient {
    config: ClientConfig,
    http: Client,
    token: Mutex<Option<String>>,
}

impl ReqwestClient {
    /// Creates a client. No request is sent until the first call.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("ledgermirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            config,
            http,
            token: Mutex::new(None),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Requests a new access token with the OAuth2 password grant.
    fn request_token(&self) -> ClientResult<String> {
        debug!("Authenticating...");
        let response = self
            .http
            .post(&self.config.auth_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "password"),
                ("scope", "read"),
                ("username", self.config.api_key.as_str()),
                ("password", self.config.api_key.as_str()),
            ])
            .send()
            .map_err(|e| ClientError::Network(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(ClientError::Auth(format!("{status}: {body}")));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| ClientError::Auth(format!("failed to parse token response: {e}")))?;
        debug!(
            token_type = token.token_type.as_deref().unwrap_or("unknown"),
            "Authenticated successfully"
        );
        Ok(token.access_token)
    }

    /// Returns the current access token, authenticating on first use.
    fn access_token(&self) -> ClientResult<String> {
        let mut guard = self.token.lock();
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.request_token()?;
        *guard = Some(token.clone());
        Ok(token)
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        let token = self.access_token().map_err(|e| e.to_string())?;

        let mut builder = self
            .http
            .get(&request.url)
            .query(&request.params)
            .bearer_auth(token);
        if let Some(accept) = request.accept {
            builder = builder.header(ACCEPT, accept);
        }

        let response = builder
            .send()
            .map_err(|e| format!("request to {} failed: {e}", request.url))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| format!("failed to read response from {}: {e}", request.url))?;

        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }

    fn authenticate(&self) -> Result<(), String> {
        let token = self.request_token().map_err(|e| e.to_string())?;
        *self.token.lock() = Some(token);
        Ok(())
    }
}

/// Builds the engine transport for `config`.
pub fn connect(config: ClientConfig) -> ClientResult<HttpTransport<ReqwestClient>> {
    let base_url = config.base_url.clone();
    let organization_id = config.organization_id.clone();
    let client = ReqwestClient::new(config)?;
    Ok(HttpTransport::new(base_url, organization_id, client))
}
