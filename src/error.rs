//! Error types for colbridge operations.

use thiserror::Error;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error types for colbridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Mutating accessor called on a read-only column vector.
    #[error("read-only column vector: {0}")]
    ReadOnlyVector(String),

    /// Type mismatch errors.
    #[error("type error: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },

    /// Argument planning errors (malformed chains, unsupported nesting).
    #[error("plan error: {0}")]
    PlanError(String),

    /// Invalid expression during projection.
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    /// Unsupported operation in the current context.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The 1:1 row contract between this side and the worker was broken.
    #[error("protocol violation: {message} (rows sent: {sent}, rows returned: {returned})")]
    ProtocolViolation {
        message: String,
        sent: u64,
        returned: u64,
    },

    /// I/O failure while spilling rows or reading a spilled page back.
    #[error("spill error: {0}")]
    SpillError(String),

    /// Checksum validation failure on a spilled record.
    #[error("checksum mismatch: {0}")]
    ChecksumError(String),

    /// Row image encode/decode failure.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// External worker failure (process crash, malformed batch).
    #[error("worker error: {0}")]
    WorkerError(String),

    /// Malformed columnar buffers handed to a vector constructor.
    #[error("vector layout error: {0}")]
    VectorLayout(String),
}

impl BridgeError {
    /// Builds the protocol violation raised when `remove()` outruns `add()`.
    #[must_use]
    pub fn remove_past_end(added: u64, removed: u64) -> Self {
        BridgeError::ProtocolViolation {
            message: "remove() called past the last enqueued row".to_string(),
            sent: added,
            returned: removed,
        }
    }
}
