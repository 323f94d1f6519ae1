//! External worker channel interface.
//!
//! The worker process lifecycle and its wire serialization live behind
//! this trait; the bridge only depends on the ordered request/response
//! contract.

use crate::error::Result;
use crate::vector::ColumnBatch;

/// Calling-convention tag for columnar batch evaluation.
pub const EVAL_MODE_COLUMNAR: i32 = 200;

/// Channel setup parameters.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Maximum rows per outbound batch.
    pub max_rows_per_batch: usize,
    /// Whether worker processes may be reused across batches.
    pub reuse_worker: bool,
    /// Numeric tag identifying the columnar calling convention.
    pub eval_mode: i32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            max_rows_per_batch: 1024,
            reuse_worker: true,
            eval_mode: EVAL_MODE_COLUMNAR,
        }
    }
}

impl ChannelConfig {
    /// Creates a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum rows per outbound batch.
    #[must_use]
    pub fn with_max_rows_per_batch(mut self, rows: usize) -> Self {
        self.max_rows_per_batch = rows.max(1);
        self
    }

    /// Sets whether worker processes may be reused across batches.
    #[must_use]
    pub fn with_reuse_worker(mut self, reuse: bool) -> Self {
        self.reuse_worker = reuse;
        self
    }

    /// Sets the evaluation-mode tag.
    #[must_use]
    pub fn with_eval_mode(mut self, eval_mode: i32) -> Self {
        self.eval_mode = eval_mode;
        self
    }
}

/// An ordered request/response channel to the external worker.
///
/// Implementations must preserve row order end-to-end: the concatenation
/// of received batches matches the concatenation of sent batches 1:1,
/// though batch boundaries on return need not match those sent.
pub trait WorkerChannel {
    /// Sends one input batch to the worker.
    ///
    /// # Errors
    ///
    /// Returns a worker error if the batch cannot be delivered.
    fn send(&mut self, batch: ColumnBatch) -> Result<()>;

    /// Signals that no more input batches will be sent.
    ///
    /// # Errors
    ///
    /// Returns a worker error if the signal cannot be delivered.
    fn finish(&mut self) -> Result<()>;

    /// Receives the next result batch, blocking until one is available.
    /// Returns `None` once every result batch has been delivered.
    ///
    /// # Errors
    ///
    /// Returns a worker error on process crash or malformed output.
    fn recv(&mut self) -> Result<Option<ColumnBatch>>;

    /// Cancels in-flight work; the worker is expected to unwind rather
    /// than continue producing unconsumed output.
    fn cancel(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ChannelConfig::new()
            .with_max_rows_per_batch(10)
            .with_reuse_worker(false)
            .with_eval_mode(EVAL_MODE_COLUMNAR);
        assert_eq!(config.max_rows_per_batch, 10);
        assert!(!config.reuse_worker);
        assert_eq!(config.eval_mode, EVAL_MODE_COLUMNAR);
    }

    #[test]
    fn test_batch_size_floor() {
        let config = ChannelConfig::new().with_max_rows_per_batch(0);
        assert_eq!(config.max_rows_per_batch, 1);
    }
}
