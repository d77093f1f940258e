//! Error types for the sync engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or HTTP failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// HTTP status code, if the server answered.
        status: Option<u16>,
        /// Whether a re-authentication retry is meaningful.
        retryable: bool,
    },

    /// Malformed response body.
    #[error("decode error: {0}")]
    Decode(String),

    /// Local file write failure.
    #[error("persistence error at {}: {source}", path.display())]
    Persistence {
        /// File or directory that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint or collection file unreadable or invalid.
    #[error("corrupt state at {}: {reason}", path.display())]
    StateCorruption {
        /// File that failed to load.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// Invalid engine configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Creates a transport error for a failed request that never got a status.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
            retryable: false,
        }
    }

    /// Creates a transport error for a non-success HTTP status.
    pub fn status(code: u16, body: impl AsRef<str>) -> Self {
        Self::Transport {
            message: format!(
                "request failed with status code {}: {}",
                code,
                body.as_ref()
            ),
            status: Some(code),
            retryable: code == 401,
        }
    }

    /// Creates a persistence error for the given path.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Creates a state corruption error for the given path.
    pub fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StateCorruption {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if a single re-authentication may fix this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Returns the HTTP status code, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            SyncError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}
