//! Error types for the admission gateway.

use thiserror::Error;

/// Error type for gateway operations
#[derive(Error, Debug)]
pub enum Error {
    /// TLS material could not be loaded or parsed
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Check whether a Kubernetes API error indicates a not-found condition.
///
/// Cleanup treats deleting an already-absent object as success.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404)
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;
