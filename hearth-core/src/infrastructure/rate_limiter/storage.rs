//! Rate Limit Storage Backends
//!
//! Provides keyed-counter stores with atomic increment-and-expire semantics:
//! - Redis/Dragonfly for distributed, multi-instance deployments
//! - In-memory for development and single-instance deployments

use async_trait::async_trait;
use dashmap::DashMap;
use redis::Script;
use redis::aio::ConnectionManager;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::types::CounterState;
use crate::config::RedisConfig;
use crate::infrastructure::clock::Clock;

/// Store failure. Never reported as a count or a denial.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),

    #[error("rate limit store timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout(_))
    }
}

/// Which backend a store is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    InMemory,
    Redis,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::InMemory => "memory",
            StorageBackend::Redis => "redis",
        }
    }

    /// Counters are shared across instances
    pub fn is_distributed(&self) -> bool {
        matches!(self, StorageBackend::Redis)
    }
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for rate limit storage backends
#[async_trait]
pub trait RateLimitStorage: Send + Sync {
    /// Atomically increment `key`, creating it with TTL = `window` on first
    /// touch, and report the new count against `limit`
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
    ) -> Result<CounterState, StoreError>;

    /// Remaining time-to-live of a counter; `None` if it does not exist
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Delete a counter (administrative reset)
    async fn reset(&self, key: &str) -> Result<(), StoreError>;

    /// Purge expired entries (no-op for stores with native expiry)
    async fn cleanup(&self);

    fn backend(&self) -> StorageBackend;
}

/// INCR then PEXPIRE on first touch. Also repairs a counter left without a TTL.
const INCREMENT_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 or redis.call('PTTL', KEYS[1]) == -1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return current
"#;

/// Redis/Dragonfly storage backend
pub struct RedisRateLimitStorage {
    connection_manager: ConnectionManager,
    increment_script: Script,
    command_timeout: Duration,
}

impl RedisRateLimitStorage {
    /// Connect and verify the server answers
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            warn!("Failed to create Redis client for rate limiting: {}", e);
            StoreError::Unavailable(format!("invalid client configuration: {}", e))
        })?;

        let connection_manager =
            match tokio::time::timeout(config.connect_timeout(), ConnectionManager::new(client))
                .await
            {
                Ok(Ok(manager)) => manager,
                Ok(Err(e)) => {
                    warn!("Failed to create connection manager for rate limiting: {}", e);
                    return Err(StoreError::Unavailable(e.to_string()));
                }
                Err(_) => return Err(StoreError::Timeout(config.connect_timeout())),
            };

        let storage = Self::from_connection(connection_manager, config.command_timeout());
        storage.ping().await?;

        debug!("Connected to Redis for rate limiting");
        Ok(storage)
    }

    /// Wrap an existing connection manager
    pub fn from_connection(connection_manager: ConnectionManager, command_timeout: Duration) -> Self {
        Self {
            connection_manager,
            increment_script: Script::new(INCREMENT_SCRIPT),
            command_timeout,
        }
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        self.bounded(async move { redis::cmd("PING").query_async::<String>(&mut conn).await })
            .await
            .map(|_| ())
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Unavailable(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.command_timeout)),
        }
    }
}

#[async_trait]
impl RateLimitStorage for RedisRateLimitStorage {
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
    ) -> Result<CounterState, StoreError> {
        let mut conn = self.connection_manager.clone();
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut invocation = self.increment_script.key(key);
        invocation.arg(window_ms);

        let count: u64 = self.bounded(invocation.invoke_async(&mut conn)).await?;
        Ok(CounterState::new(count, limit))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.connection_manager.clone();
        let millis: i64 = self
            .bounded(redis::cmd("PTTL").arg(key).query_async(&mut conn))
            .await?;

        // -2: no such key, -1: no expiry
        Ok(match millis {
            -2 => None,
            -1 => Some(Duration::MAX),
            ms => Some(Duration::from_millis(u64::try_from(ms).unwrap_or(0))),
        })
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.connection_manager.clone();
        self.bounded(redis::cmd("DEL").arg(key).query_async::<i64>(&mut conn))
            .await?;
        Ok(())
    }

    async fn cleanup(&self) {
        // Redis expires counters itself
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Redis
    }
}

/// In-memory counter record
#[derive(Debug, Clone, Copy)]
struct CounterRecord {
    count: u64,
    expires_at_ms: i64,
}

impl CounterRecord {
    fn fresh(now_ms: i64, window: Duration) -> Self {
        let ttl_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        Self {
            count: 0,
            expires_at_ms: now_ms.saturating_add(ttl_ms),
        }
    }

    fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// In-memory storage backend for development/single instance
///
/// Counters live in a sharded map; an increment holds only the lock of the
/// shard owning its key.
pub struct InMemoryRateLimitStorage {
    counters: DashMap<String, CounterRecord>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRateLimitStorage {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }

    /// Number of live and not-yet-purged counters
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }
}

#[async_trait]
impl RateLimitStorage for InMemoryRateLimitStorage {
    async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
        limit: u32,
    ) -> Result<CounterState, StoreError> {
        let now_ms = self.now_ms();
        let mut record = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| CounterRecord::fresh(now_ms, window));

        if record.is_expired(now_ms) {
            *record = CounterRecord::fresh(now_ms, window);
        }
        record.count += 1;

        Ok(CounterState::new(record.count, limit))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now_ms = self.now_ms();
        Ok(self.counters.get(key).and_then(|record| {
            if record.is_expired(now_ms) {
                None
            } else {
                let remaining = record.expires_at_ms - now_ms;
                Some(Duration::from_millis(u64::try_from(remaining).unwrap_or(0)))
            }
        }))
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.counters.remove(key);
        Ok(())
    }

    async fn cleanup(&self) {
        let now_ms = self.now_ms();
        let before = self.counters.len();
        self.counters.retain(|_, record| !record.is_expired(now_ms));
        let purged = before.saturating_sub(self.counters.len());
        if purged > 0 {
            debug!(purged, "Purged expired rate limit counters");
        }
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::InMemory
    }
}
