//! In-process counter store
//!
//! Same contract as the Redis store, scoped to one process. Used by tests and
//! single-host deployments that still want bounded prover concurrency.

use crate::error::StoreError;
use crate::store::{CounterStore, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: i64,
    expires_at: Instant,
}

/// Counter store backed by a mutex-guarded map
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current live value at `key`, or `None` if absent or expired
    pub fn value(&self, key: &str) -> Option<i64> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Command("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    fn address(&self) -> String {
        "memory://local".to_string()
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let current = entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map_or(0, |entry| entry.value);
        let value = current + 1;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(value)
    }

    async fn decrement_and_cleanup(&self, key: &str) -> StoreResult<i64> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let live = entries.get(key).filter(|entry| entry.expires_at > now).copied();
        let value = live.map_or(0, |entry| entry.value) - 1;

        match live {
            Some(entry) if value > 0 => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value,
                        expires_at: entry.expires_at,
                    },
                );
            }
            _ => {
                entries.remove(key);
            }
        }
        Ok(value)
    }
}
