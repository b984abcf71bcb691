//! Error types for the mempool.

use thiserror::Error;

/// Mempool failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    /// The transaction is already pooled.
    #[error("Transaction already exists: {0}")]
    AlreadyExists(String),

    /// An input is already spent by a pooled transaction.
    #[error("Double spend of input {0}")]
    DoubleSpend(String),

    /// The transaction is not in the pool.
    #[error("Transaction not found: {0}")]
    NotFound(String),
}

/// Result type for mempool operations.
pub type MempoolResult<T> = Result<T, MempoolError>;
