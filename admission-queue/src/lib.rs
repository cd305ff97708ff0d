//! Admission Queue - Distributed counting semaphore for prover invocations
//!
//! Bounds how many external prover processes may run at the same time across
//! every bridge process and host sharing one counter store.
//!
//! # Overview
//!
//! * A shared integer counter lives at a configured key in the store
//! * Acquiring a slot atomically increments the counter and refreshes its TTL;
//!   an attempt that lands above the limit is rolled back and retried after a
//!   fixed poll interval until the queue deadline passes
//! * The TTL lets slots held by crashed processes expire on their own
//! * When the store is unreachable the queue can fail open (no limiting, a
//!   warning in the log) or fail closed with [`QueueError::Backend`]
//!
//! # Usage
//!
//! ```no_run
//! use admission_queue::{AdmissionQueue, QueueSettings, RedisCounterStore};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), admission_queue::QueueError> {
//! let store = RedisCounterStore::open("redis://127.0.0.1:6379")?;
//! let queue = AdmissionQueue::new(Arc::new(store), QueueSettings::default());
//!
//! let proof = queue
//!     .run_with_lease(async { Ok::<_, admission_queue::QueueError>("proved") })
//!     .await?;
//! # let _ = proof;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod queue;
pub mod redis_store;
pub mod store;

pub use error::{QueueError, StoreError};
pub use memory::MemoryCounterStore;
pub use queue::{AdmissionQueue, QueueLease, QueueSettings};
pub use redis_store::RedisCounterStore;
pub use store::CounterStore;

/// Result type for admission queue operations
pub type Result<T> = std::result::Result<T, QueueError>;
