//! Error types for pulse-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Credential read failed for {path}: {source}")]
    CredentialRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
