//! Admission queue and leases
//!
//! A lease represents one held slot of the distributed semaphore. Leases are
//! released exactly once: explicitly through [`QueueLease::release`], or from
//! `Drop` when the holder unwound or was cancelled before releasing.

use crate::error::{QueueError, StoreError};
use crate::store::CounterStore;
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Admission policy for the prover slots
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Key of the shared counter
    pub key: String,
    /// Maximum number of concurrently held slots
    pub max_concurrent: u32,
    /// How long to wait for a free slot before giving up
    pub queue_timeout: Duration,
    /// Expiry refreshed on every acquisition attempt
    pub slot_ttl: Duration,
    /// Pause between acquisition attempts
    pub poll_interval: Duration,
    /// Degrade to "no limiting" when the store fails
    pub fail_open: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            key: "garaga:prover:slots".to_string(),
            max_concurrent: 2,
            queue_timeout: Duration::from_secs(120),
            slot_ttl: Duration::from_secs(600),
            poll_interval: Duration::from_millis(250),
            fail_open: true,
        }
    }
}

/// A slot in the distributed semaphore
pub struct QueueLease {
    backing_store_address: Option<String>,
    key: String,
    acquired: bool,
    store: Option<Arc<dyn CounterStore>>,
}

impl QueueLease {
    fn unacquired(backing_store_address: Option<String>, key: &str) -> Self {
        Self {
            backing_store_address,
            key: key.to_string(),
            acquired: false,
            store: None,
        }
    }

    fn acquired(store: Arc<dyn CounterStore>, key: &str) -> Self {
        Self {
            backing_store_address: Some(store.address()),
            key: key.to_string(),
            acquired: true,
            store: Some(store),
        }
    }

    /// Whether this lease holds a slot that still has to be released
    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Counter key the slot is counted under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Address of the store the lease was taken against, if any
    pub fn backing_store_address(&self) -> Option<&str> {
        self.backing_store_address.as_deref()
    }

    /// Give the slot back
    ///
    /// No-op when the lease was never acquired or was already released. Store
    /// errors are logged and swallowed; the slot TTL bounds any leak.
    pub async fn release(&mut self) {
        if !self.acquired {
            return;
        }
        self.acquired = false;

        let Some(store) = self.store.take() else {
            return;
        };
        match store.decrement_and_cleanup(&self.key).await {
            Ok(remaining) => {
                tracing::debug!(
                    "Released prover slot on {} ({} still held)",
                    self.key,
                    remaining.max(0)
                );
            }
            Err(err) => {
                tracing::warn!("Failed to release prover slot on {}: {}", self.key, err);
            }
        }
    }
}

impl std::fmt::Debug for QueueLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueLease")
            .field("backing_store_address", &self.backing_store_address)
            .field("key", &self.key)
            .field("acquired", &self.acquired)
            .finish()
    }
}

impl Drop for QueueLease {
    fn drop(&mut self) {
        if !self.acquired {
            return;
        }
        self.acquired = false;

        let Some(store) = self.store.take() else {
            return;
        };
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(
                    "Prover slot on {} dropped while held, releasing in background",
                    key
                );
                handle.spawn(async move {
                    if let Err(err) = store.decrement_and_cleanup(&key).await {
                        tracing::warn!("Background release of {} failed: {}", key, err);
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    "Prover slot on {} dropped outside a runtime, leaving it to expire",
                    key
                );
            }
        }
    }
}

/// Distributed counting semaphore bounding concurrent prover runs
pub struct AdmissionQueue {
    store: Option<Arc<dyn CounterStore>>,
    settings: QueueSettings,
}

impl AdmissionQueue {
    /// Queue limited through `store`
    pub fn new(store: Arc<dyn CounterStore>, settings: QueueSettings) -> Self {
        Self {
            store: Some(store),
            settings,
        }
    }

    /// Queue that performs no limiting; every lease is unacquired
    ///
    /// Used when no store is configured, and for nested invocations whose
    /// caller already holds a slot.
    pub fn disabled(settings: QueueSettings) -> Self {
        Self {
            store: None,
            settings,
        }
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Wait for a free slot
    ///
    /// # Returns
    /// * `Ok(QueueLease)` - Acquired lease, or an unacquired one when the queue
    ///   is disabled or degraded under fail-open
    /// * `Err(QueueError::Timeout)` - No slot within `queue_timeout`
    /// * `Err(QueueError::Backend)` - Store failure with fail-open disabled
    pub async fn acquire(&self) -> Result<QueueLease> {
        let settings = &self.settings;
        let Some(store) = &self.store else {
            return Ok(QueueLease::unacquired(None, &settings.key));
        };

        let started = Instant::now();
        let deadline = started + settings.queue_timeout;
        let limit = i64::from(settings.max_concurrent);
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            match store.increment_with_ttl(&settings.key, settings.slot_ttl).await {
                Ok(count) if count <= limit => {
                    tracing::info!(
                        "Acquired prover slot {}/{} on {} after {} attempt(s)",
                        count,
                        limit,
                        settings.key,
                        attempts
                    );
                    return Ok(QueueLease::acquired(Arc::clone(store), &settings.key));
                }
                Ok(count) => {
                    tracing::debug!("Prover slots busy ({}/{}), backing off", count, limit);
                    if let Err(err) = store.decrement_and_cleanup(&settings.key).await {
                        return self.degrade(store.as_ref(), err);
                    }
                }
                Err(err) => return self.degrade(store.as_ref(), err),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(QueueError::Timeout {
                    key: settings.key.clone(),
                    waited: now - started,
                    max_concurrent: settings.max_concurrent,
                });
            }
            tokio::time::sleep(settings.poll_interval.min(deadline - now)).await;
        }
    }

    /// Release a lease; equivalent to [`QueueLease::release`]
    pub async fn release(&self, lease: &mut QueueLease) {
        lease.release().await;
    }

    /// Run `operation` while holding a slot
    ///
    /// The slot is released after the operation resolves, whatever its
    /// outcome. If the operation panics or this future is dropped, the lease's
    /// `Drop` releases the slot instead.
    pub async fn run_with_lease<F, T, E>(&self, operation: F) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: From<QueueError>,
    {
        let mut lease = self.acquire().await?;
        let outcome = operation.await;
        lease.release().await;
        outcome
    }

    fn degrade(&self, store: &dyn CounterStore, err: StoreError) -> Result<QueueLease> {
        if self.settings.fail_open {
            tracing::warn!(
                "Admission queue store {} failed, continuing without limiting: {}",
                store.address(),
                err
            );
            Ok(QueueLease::unacquired(Some(store.address()), &self.settings.key))
        } else {
            Err(QueueError::Backend(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCounterStore;
    use crate::redis_store::RedisCounterStore;
    use crate::store::StoreResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        fn address(&self) -> String {
            "failing://".to_string()
        }

        async fn increment_with_ttl(&self, _key: &str, _ttl: Duration) -> StoreResult<i64> {
            Err(StoreError::Command("boom".to_string()))
        }

        async fn decrement_and_cleanup(&self, _key: &str) -> StoreResult<i64> {
            Err(StoreError::Command("boom".to_string()))
        }
    }

    fn fast_settings(max_concurrent: u32) -> QueueSettings {
        QueueSettings {
            key: "test:slots".to_string(),
            max_concurrent,
            queue_timeout: Duration::from_secs(5),
            slot_ttl: Duration::from_secs(30),
            poll_interval: Duration::from_millis(5),
            fail_open: true,
        }
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let store = Arc::new(MemoryCounterStore::new());
        let queue = AdmissionQueue::new(store.clone(), fast_settings(2));

        let mut lease = queue.acquire().await.unwrap();
        assert!(lease.is_acquired());
        assert_eq!(lease.key(), "test:slots");
        assert_eq!(lease.backing_store_address(), Some("memory://local"));
        assert_eq!(store.value("test:slots"), Some(1));

        queue.release(&mut lease).await;
        assert!(!lease.is_acquired());
        assert_eq!(store.value("test:slots"), None);

        // Second release is a no-op.
        lease.release().await;
        assert_eq!(store.value("test:slots"), None);
    }

    /// Five holders contend for `settings.max_concurrent` slots on `store`
    async fn assert_concurrency_bounded(store: Arc<dyn CounterStore>, settings: QueueSettings) {
        let key = settings.key.clone();
        let limit = settings.max_concurrent as usize;
        let queue = Arc::new(AdmissionQueue::new(Arc::clone(&store), settings));
        let holders = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let queue = Arc::clone(&queue);
            let holders = Arc::clone(&holders);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let mut lease = queue.acquire().await.unwrap();
                assert!(lease.is_acquired());
                let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                holders.fetch_sub(1, Ordering::SeqCst);
                lease.release().await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= limit, "peak was {}", peak);

        // Every slot came back: the next increment starts from zero.
        let ttl = Duration::from_secs(30);
        assert_eq!(store.increment_with_ttl(&key, ttl).await.unwrap(), 1);
        assert_eq!(store.decrement_and_cleanup(&key).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_limit() {
        let store = Arc::new(MemoryCounterStore::new());
        assert_concurrency_bounded(store.clone(), fast_settings(2)).await;
        assert_eq!(store.value("test:slots"), None);
    }

    /// Runs the counter scripts against a live server named by
    /// `GARAGA_TEST_REDIS_URL`
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "needs a Redis server in GARAGA_TEST_REDIS_URL"]
    async fn test_redis_concurrency_never_exceeds_limit() {
        let Ok(url) = std::env::var("GARAGA_TEST_REDIS_URL") else {
            eprintln!("GARAGA_TEST_REDIS_URL not set, skipping");
            return;
        };
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let settings = QueueSettings {
            key: format!("test:slots:{}", nanos),
            ..fast_settings(2)
        };
        let store = RedisCounterStore::open(&url).unwrap();
        assert_concurrency_bounded(Arc::new(store), settings).await;
    }

    #[tokio::test]
    async fn test_timeout_when_slots_exhausted() {
        let store = Arc::new(MemoryCounterStore::new());
        let mut settings = fast_settings(1);
        settings.queue_timeout = Duration::from_millis(50);
        let queue = AdmissionQueue::new(store.clone(), settings);

        let mut held = queue.acquire().await.unwrap();
        let err = queue.acquire().await.unwrap_err();
        assert!(matches!(err, QueueError::Timeout { max_concurrent: 1, .. }), "got {:?}", err);

        // Rejected attempts were rolled back.
        assert_eq!(store.value("test:slots"), Some(1));
        held.release().await;
        assert_eq!(store.value("test:slots"), None);
    }

    #[tokio::test]
    async fn test_fail_open_returns_unacquired_lease() {
        let queue = AdmissionQueue::new(Arc::new(FailingStore), fast_settings(2));
        let lease = queue.acquire().await.unwrap();
        assert!(!lease.is_acquired());
        assert_eq!(lease.backing_store_address(), Some("failing://"));
    }

    #[tokio::test]
    async fn test_fail_closed_surfaces_backend_error() {
        let mut settings = fast_settings(2);
        settings.fail_open = false;
        let queue = AdmissionQueue::new(Arc::new(FailingStore), settings);
        assert!(matches!(queue.acquire().await, Err(QueueError::Backend(_))));
    }

    #[tokio::test]
    async fn test_unreachable_redis_fail_open_and_closed() {
        let store = RedisCounterStore::open("redis://127.0.0.1:1/")
            .unwrap()
            .with_io_timeout(Duration::from_millis(500));
        let store: Arc<dyn CounterStore> = Arc::new(store);

        let queue = AdmissionQueue::new(Arc::clone(&store), fast_settings(2));
        let lease = queue.acquire().await.unwrap();
        assert!(!lease.is_acquired());

        let mut strict = fast_settings(2);
        strict.fail_open = false;
        let queue = AdmissionQueue::new(store, strict);
        assert!(matches!(queue.acquire().await, Err(QueueError::Backend(_))));
    }

    #[tokio::test]
    async fn test_disabled_queue_never_limits() {
        let queue = AdmissionQueue::disabled(fast_settings(1));
        assert!(!queue.is_enabled());
        let first = queue.acquire().await.unwrap();
        let second = queue.acquire().await.unwrap();
        assert!(!first.is_acquired());
        assert!(!second.is_acquired());
        assert_eq!(first.backing_store_address(), None);
    }

    #[tokio::test]
    async fn test_run_with_lease_releases_on_error() {
        let store = Arc::new(MemoryCounterStore::new());
        let queue = AdmissionQueue::new(store.clone(), fast_settings(1));

        let outcome: std::result::Result<(), QueueError> = queue
            .run_with_lease(async {
                assert_eq!(store.value("test:slots"), Some(1));
                Err(QueueError::Backend(StoreError::Command("prover failed".to_string())))
            })
            .await;
        assert!(outcome.is_err());
        assert_eq!(store.value("test:slots"), None);

        let value = queue.run_with_lease(async { Ok::<_, QueueError>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(store.value("test:slots"), None);
    }

    #[tokio::test]
    async fn test_dropped_lease_is_released_in_background() {
        let store = Arc::new(MemoryCounterStore::new());
        let queue = AdmissionQueue::new(store.clone(), fast_settings(1));

        let lease = queue.acquire().await.unwrap();
        assert_eq!(store.value("test:slots"), Some(1));
        drop(lease);

        for _ in 0..50 {
            if store.value("test:slots").is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.value("test:slots"), None);
    }
}
