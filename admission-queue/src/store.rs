//! Counter store abstraction
//!
//! The queue only needs two primitives from its backing store, and each of
//! them must execute atomically inside the store itself.

use crate::error::StoreError;
use async_trait::async_trait;
use std::time::Duration;

/// Result type for counter store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Shared counter with per-key expiry
///
/// Invariant: implementations never rely on client-side locking for
/// correctness across processes.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Human-readable store address, recorded on leases and in logs
    fn address(&self) -> String;

    /// Increment the counter at `key` and set its TTL to `ttl`
    ///
    /// Returns the post-increment value. A missing or expired key counts as 0.
    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<i64>;

    /// Decrement the counter at `key`, deleting the key once it reaches 0 or below
    ///
    /// Returns the post-decrement value.
    async fn decrement_and_cleanup(&self, key: &str) -> StoreResult<i64>;
}
