//! Error types for the network layer.

use thiserror::Error;

/// Network protocol failures. Any of these closes the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Structurally invalid message.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Declared payload larger than the cap.
    #[error("Message too large: {size} bytes, max {max} bytes")]
    MessageTooLarge {
        /// Declared size.
        size: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// Frame checksum did not match the payload.
    #[error("Checksum mismatch")]
    ChecksumMismatch,

    /// A pong carried a nonce we never sent.
    #[error("Unmatched pong nonce: {0}")]
    UnmatchedPong(i32),

    /// No pong arrived within the ping frequency.
    #[error("Ping timed out")]
    PingTimeout,

    /// Transport failure.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for NetworkError {
    fn from(e: std::io::Error) -> Self {
        NetworkError::Io(e.to_string())
    }
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
