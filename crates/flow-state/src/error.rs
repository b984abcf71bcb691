//! Error types for world state operations.

use flow_storage::StorageError;
use thiserror::Error;

/// World state failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A referenced output or contract does not exist.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Underlying storage failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A stored value failed to decode.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for world state operations.
pub type StateResult<T> = Result<T, StateError>;
