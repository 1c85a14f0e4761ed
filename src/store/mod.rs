//! Shared counter store: windowed counters, distributed locks and a TTL cache.
//!
//! Every backend must make each operation atomic from the caller's point of
//! view, across processes and not only across tasks. Infrastructure failures
//! surface as [`StoreError::Unavailable`]; callers pick fail-open or
//! fail-closed explicitly.

pub mod lock;
pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};
use uuid::Uuid;

pub use lock::LockGuard;
pub use memory::MemoryCounterStore;
pub use postgres::PgCounterStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Result of a windowed increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    pub count: i64,
    pub ttl_remaining: Duration,
}

/// Opaque holder marker returned by a successful lock acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and arm a TTL of `window` only when this is the first
    /// increment of the window. Increment and conditional expire happen in one
    /// atomic step, so later increments never push the expiry out.
    async fn increment_with_window(&self, key: &str, window: Duration)
        -> Result<WindowCount, StoreError>;

    /// Count of a live window, 0 when the key is absent or expired.
    async fn get_count(&self, key: &str) -> Result<i64, StoreError>;

    /// Explicitly drop a counter.
    async fn reset(&self, key: &str) -> Result<(), StoreError>;

    /// Non-blocking acquire. `None` when another holder owns a live lock.
    async fn try_acquire_lock(&self, key: &str, ttl: Duration)
        -> Result<Option<LockToken>, StoreError>;

    /// Compare-and-delete: only the holder of `token` can release. Returns
    /// whether a lock was actually removed.
    async fn release_lock(&self, key: &str, token: &LockToken) -> Result<bool, StoreError>;

    async fn cache_set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn cache_get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn cache_delete(&self, key: &str) -> Result<(), StoreError>;

    /// Delete expired entries of every kind; returns how many went.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

/// Purge expired entries every `every` until the returned task is aborted.
pub fn spawn_purger(store: Arc<dyn CounterStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!("Purged {} expired store entries", removed),
                Err(e) => warn!("Store purge failed: {}", e),
            }
        }
    })
}
