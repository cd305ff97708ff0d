//! Redis-backed counter store
//!
//! Both primitives run as server-side Lua scripts, so increment-plus-expire and
//! decrement-plus-delete are each a single atomic operation on the server.

use crate::error::StoreError;
use crate::store::{CounterStore, StoreResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Script;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;

const INCREMENT_WITH_TTL: &str = r#"
local value = redis.call('INCR', KEYS[1])
redis.call('PEXPIRE', KEYS[1], ARGV[1])
return value
"#;

const DECREMENT_AND_CLEANUP: &str = r#"
local value = redis.call('DECR', KEYS[1])
if value <= 0 then
    redis.call('DEL', KEYS[1])
end
return value
"#;

/// Default bound on connecting and on each command round trip
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Counter store talking to a Redis server
pub struct RedisCounterStore {
    client: redis::Client,
    address: String,
    io_timeout: Duration,
    connection: Mutex<Option<MultiplexedConnection>>,
    increment: Script,
    decrement: Script,
}

impl RedisCounterStore {
    /// Create a store for `url` without connecting yet
    ///
    /// The connection is opened lazily on first use so that an unreachable
    /// server surfaces as a store error the queue can degrade on.
    pub fn open(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(|err| StoreError::Unreachable {
            address: url.to_string(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            client,
            address: url.to_string(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            connection: Mutex::new(None),
            increment: Script::new(INCREMENT_WITH_TTL),
            decrement: Script::new(DECREMENT_AND_CLEANUP),
        })
    }

    /// Override the connect/command timeout
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    async fn connection(&self) -> StoreResult<MultiplexedConnection> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        tracing::debug!("Connecting to counter store at {}", self.address);
        let conn = tokio::time::timeout(
            self.io_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StoreError::Unreachable {
            address: self.address.clone(),
            reason: format!("connect timed out after {:?}", self.io_timeout),
        })?
        .map_err(|err| StoreError::Unreachable {
            address: self.address.clone(),
            reason: err.to_string(),
        })?;

        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection so the next call reconnects
    async fn reset(&self) {
        *self.connection.lock().await = None;
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = redis::RedisResult<T>>,
    ) -> StoreResult<T> {
        let outcome = match tokio::time::timeout(self.io_timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(StoreError::from(err)),
            Err(_) => Err(StoreError::Command(format!(
                "command timed out after {:?}",
                self.io_timeout
            ))),
        };
        if outcome.is_err() {
            self.reset().await;
        }
        outcome
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn increment_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let mut conn = self.connection().await?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        self.bounded(async {
            self.increment
                .key(key)
                .arg(ttl_ms)
                .invoke_async::<_, i64>(&mut conn)
                .await
        })
        .await
    }

    async fn decrement_and_cleanup(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.connection().await?;
        self.bounded(async {
            self.decrement
                .key(key)
                .invoke_async::<_, i64>(&mut conn)
                .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_invalid_url() {
        let result = RedisCounterStore::open("not a url");
        assert!(matches!(result, Err(StoreError::Unreachable { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_store_error() {
        // Nothing listens on port 1; the connect attempt is refused.
        let store = RedisCounterStore::open("redis://127.0.0.1:1/")
            .unwrap()
            .with_io_timeout(Duration::from_millis(500));

        let result = store.increment_with_ttl("k", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(StoreError::Unreachable { .. })), "got {:?}", result);
        assert_eq!(store.address(), "redis://127.0.0.1:1/");
    }
}
