//! Error types for tree stores

use thiserror::Error;

/// Error returned by every [`crate::TreeStore`] operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The path contains an empty segment or a forbidden character.
    #[error("invalid store path: {0}")]
    InvalidPath(String),
    /// Transport failure (connection refused, reset, timeout, offline).
    #[error("network error: {0}")]
    Network(String),
    /// The backend answered with a non-success status.
    #[error("store returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },
    /// Security rules rejected the request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The subscription was cancelled by the backend.
    #[error("subscription closed")]
    Closed,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
