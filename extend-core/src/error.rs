//! Error types for Extend operations.

use std::io;
use thiserror::Error;

/// The main error type for Extend operations.
#[derive(Debug, Error)]
pub enum ExtendError {
    /// A received frame could not be decoded or carried an unknown type id.
    ///
    /// Fatal to the connection: the correlation table can no longer be trusted.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// No response arrived within the configured window.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// The transport failed or the connection was closed.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The peer executed the request but reported a failure.
    #[error("remote operation failed ({code}): {message}")]
    Remote {
        /// The error code reported by the peer.
        code: i32,
        /// The error message reported by the peer.
        message: String,
    },

    /// An aggregated value was not of the expected numeric kind.
    #[error("aggregation type mismatch: {0}")]
    AggregationTypeMismatch(String),

    /// The caller abandoned the pending call.
    #[error("request cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ExtendError {
    /// Returns `true` if retrying the same call may succeed.
    ///
    /// Only timeouts are local to a single call; every other failure either
    /// reflects a broken connection or a deterministic remote outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtendError::Timeout(_))
    }

    /// Returns `true` if the error means the connection is unusable.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            ExtendError::ConnectionLost(_) | ExtendError::ProtocolViolation(_)
        )
    }
}

/// A specialized `Result` type for Extend operations.
pub type Result<T> = std::result::Result<T, ExtendError>;
