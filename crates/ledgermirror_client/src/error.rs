//! Error types for the HTTP client.

use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors from configuring the client or talking to the auth server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Required environment variables are not set.
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<&'static str>),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Build(String),

    /// The request never got an answer.
    #[error("network error: {0}")]
    Network(String),

    /// The auth server rejected the credentials or answered garbage.
    #[error("authentication failed: {0}")]
    Auth(String),
}
