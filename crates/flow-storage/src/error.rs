//! Error types for the storage layer.

use thiserror::Error;

/// Storage failures.
///
/// These are transient or systemic: loggable and retryable, never part of
/// the consensus `Invalid*` taxonomies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A key the caller required was absent.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A stored value failed to decode.
    #[error("Serde error: {0}")]
    Serde(String),

    /// Any other engine failure.
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
