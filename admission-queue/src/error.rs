//! Error types for the admission queue

use std::time::Duration;
use thiserror::Error;

/// Failure of a counter store operation
#[derive(Error, Debug)]
pub enum StoreError {
    /// Store could not be reached within the connect timeout
    #[error("counter store unreachable at {address}: {reason}")]
    Unreachable { address: String, reason: String },

    /// Store was reached but the command failed
    #[error("counter store command failed: {0}")]
    Command(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Command(err.to_string())
    }
}

/// Errors surfaced by [`crate::AdmissionQueue`]
#[derive(Error, Debug)]
pub enum QueueError {
    /// No slot freed up before the queue deadline
    #[error("no prover slot available on {key} after {waited:?} (max_concurrent={max_concurrent})")]
    Timeout {
        key: String,
        waited: Duration,
        max_concurrent: u32,
    },

    /// Store failed while fail-open is disabled
    #[error("admission queue backend error: {0}")]
    Backend(#[from] StoreError),
}
