//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via [`HttpClient`] so that the
//! engine does not depend on a specific HTTP library. The transport owns
//! URL construction, the organization placeholder, status mapping, JSON
//! decoding and the single re-authentication retry on `401`.

use crate::error::{SyncError, SyncResult};
use crate::transport::{Query, Transport};
use serde_json::Value;
use tracing::debug;

/// Placeholder replaced with the organization id in endpoint paths.
pub const ORGANIZATION_PLACEHOLDER: &str = "{organizationId}";

/// A fully resolved GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute URL without query string.
    pub url: String,
    /// Query string parameters.
    pub params: Vec<(String, String)>,
    /// Value of the `Accept` header, if any.
    pub accept: Option<&'static str>,
}

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// Implementations attach credentials to every request and obtain them
/// lazily. Network failures are reported as `Err(message)`; any answer from
/// the server, including error statuses, is an `Ok(HttpResponse)`.
pub trait HttpClient {
    /// Sends a GET request.
    fn get(&self, request: &HttpRequest) -> Result<HttpResponse, String>;

    /// Discards the current credentials and obtains new ones.
    fn authenticate(&self) -> Result<(), String>;
}

/// HTTP-based transport for the accounting API.
pub struct HttpTransport<C: HttpClient> {
    /// Base URL of the API (e.g. "https://api.example.com").
    base_url: String,
    /// Organization id substituted into endpoint paths.
    organization_id: String,
    /// HTTP client implementation.
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, organization_id: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            organization_id: organization_id.into(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Resolves an endpoint path into an absolute URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.base_url,
            path.replacen(ORGANIZATION_PLACEHOLDER, &self.organization_id, 1)
        )
    }

    fn send(&self, query: &Query, accept: Option<&'static str>) -> SyncResult<Vec<u8>> {
        let request = HttpRequest {
            url: self.url(&query.path),
            params: query.params.clone(),
            accept,
        };
        debug!("Request: GET {} {:?}", request.url, request.params);

        let mut response = self.client.get(&request).map_err(SyncError::network)?;

        if response.status == 401 {
            debug!("401 Unauthorized, refreshing token...");
            self.client
                .authenticate()
                .map_err(|e| SyncError::network(format!("authentication failed: {e}")))?;
            response = self.client.get(&request).map_err(SyncError::network)?;
        }

        if response.status >= 400 {
            let body = String::from_utf8_lossy(&response.body);
            return Err(SyncError::status(response.status, body));
        }

        Ok(response.body)
    }
}

impl<C: HttpClient> Transport for HttpTransport<C> {
    fn fetch(&self, query: &Query) -> SyncResult<Value> {
        let body = self.send(query, Some("application/json"))?;
        serde_json::from_slice(&body).map_err(|e| {
            SyncError::Decode(format!("failed to decode response from {}: {}", query.path, e))
        })
    }

    fn fetch_blob(&self, query: &Query) -> SyncResult<Vec<u8>> {
        self.send(query, Some("application/octet-stream"))
    }
}
