use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{CounterStore, LockToken, StoreError};

/// A held distributed lock.
///
/// Call [`LockGuard::release`] when done. A guard dropped without release
/// (cancelled request, early return) schedules the release on the runtime;
/// the TTL still bounds the hold if that task never runs.
pub struct LockGuard {
    store: Arc<dyn CounterStore>,
    key: String,
    token: Option<LockToken>,
}

impl LockGuard {
    /// Try once to take `key`. `Ok(None)` when someone else holds it.
    pub async fn acquire(
        store: Arc<dyn CounterStore>,
        key: impl Into<String>,
        ttl: Duration,
    ) -> Result<Option<Self>, StoreError> {
        let key = key.into();
        let token = store.try_acquire_lock(&key, ttl).await?;
        Ok(token.map(|token| {
            debug!("Acquired lock {}", key);
            Self { store, key, token: Some(token) }
        }))
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn release(mut self) -> Result<bool, StoreError> {
        match self.token.take() {
            Some(token) => self.store.release_lock(&self.key, &token).await,
            None => Ok(false),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.release_lock(&key, &token).await {
                        warn!("Deferred release of lock {} failed: {}", key, e);
                    }
                });
            }
            Err(_) => warn!("Lock {} dropped outside a runtime; left to expire", key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCounterStore;

    #[tokio::test]
    async fn second_acquire_fails_while_held() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
        let ttl = Duration::from_secs(30);

        let guard = LockGuard::acquire(store.clone(), "lock:a", ttl).await.unwrap().unwrap();
        assert!(LockGuard::acquire(store.clone(), "lock:a", ttl).await.unwrap().is_none());

        assert!(guard.release().await.unwrap());
        assert!(LockGuard::acquire(store, "lock:a", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn dropped_guard_releases_in_background() {
        let store: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
        let ttl = Duration::from_secs(30);

        {
            let _guard = LockGuard::acquire(store.clone(), "lock:b", ttl).await.unwrap().unwrap();
        }
        // Let the spawned release run.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(store.try_acquire_lock("lock:b", ttl).await.unwrap().is_some());
    }
}
