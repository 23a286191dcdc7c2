//! Store error types.

use thiserror::Error;

/// Store error type.
#[derive(Error, Debug)]
pub enum StoreError {
    /// IO error on one of the store files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A thread panicked while holding the store lock
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// Store path has no usable parent directory or file name
    #[error("Invalid store path: {0}")]
    InvalidPath(String),
}

/// Result type alias using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;
