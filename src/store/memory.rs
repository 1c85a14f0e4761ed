use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{CounterStore, LockToken, StoreError, WindowCount};

struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

#[derive(Default)]
struct Slots {
    counters: HashMap<String, Expiring<i64>>,
    locks: HashMap<String, Expiring<LockToken>>,
    cache: HashMap<String, Expiring<String>>,
}

/// Single-process counter store. Each operation runs under one mutex, which
/// gives the same indivisibility the shared backends provide across processes.
#[derive(Default)]
pub struct MemoryCounterStore {
    slots: Mutex<Slots>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries held, expired ones included.
    pub async fn entry_count(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.counters.len() + slots.locks.len() + slots.cache.len()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment_with_window(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<WindowCount, StoreError> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;

        let entry = slots
            .counters
            .entry(key.to_string())
            .or_insert_with(|| Expiring { value: 0, expires_at: now });

        // A fresh or expired counter starts a new window; only then is the TTL armed.
        if !entry.is_live(now) {
            entry.value = 0;
            entry.expires_at = now + window;
        }
        entry.value += 1;

        Ok(WindowCount {
            count: entry.value,
            ttl_remaining: entry.expires_at.saturating_duration_since(now),
        })
    }

    async fn get_count(&self, key: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let slots = self.slots.lock().await;
        Ok(slots
            .counters
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value)
            .unwrap_or(0))
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.slots.lock().await.counters.remove(key);
        Ok(())
    }

    async fn try_acquire_lock(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, StoreError> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;

        if slots.locks.get(key).is_some_and(|held| held.is_live(now)) {
            return Ok(None);
        }

        let token = LockToken::generate();
        slots.locks.insert(
            key.to_string(),
            Expiring { value: token.clone(), expires_at: now + ttl },
        );
        Ok(Some(token))
    }

    async fn release_lock(&self, key: &str, token: &LockToken) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        match slots.locks.get(key) {
            Some(held) if held.is_live(now) && held.value == *token => {
                slots.locks.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cache_set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let expires_at = Instant::now() + ttl;
        self.slots
            .lock()
            .await
            .cache
            .insert(key.to_string(), Expiring { value: value.to_string(), expires_at });
        Ok(())
    }

    async fn cache_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let slots = self.slots.lock().await;
        Ok(slots
            .cache
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn cache_delete(&self, key: &str) -> Result<(), StoreError> {
        self.slots.lock().await.cache.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut slots = self.slots.lock().await;
        let before = slots.counters.len() + slots.locks.len() + slots.cache.len();
        slots.counters.retain(|_, e| e.is_live(now));
        slots.locks.retain(|_, e| e.is_live(now));
        slots.cache.retain(|_, e| e.is_live(now));
        let after = slots.counters.len() + slots.locks.len() + slots.cache.len();
        Ok((before - after) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn window_ttl_is_armed_once() {
        let store = MemoryCounterStore::new();

        let first = store.increment_with_window("k", WINDOW).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.ttl_remaining, WINDOW);

        tokio::time::advance(Duration::from_secs(20)).await;
        let second = store.increment_with_window("k", WINDOW).await.unwrap();
        assert_eq!(second.count, 2);
        // The expiry stays anchored at the first increment.
        assert_eq!(second.ttl_remaining, Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn window_restarts_after_expiry() {
        let store = MemoryCounterStore::new();
        for _ in 0..5 {
            store.increment_with_window("k", WINDOW).await.unwrap();
        }
        assert_eq!(store.get_count("k").await.unwrap(), 5);

        tokio::time::advance(WINDOW).await;
        assert_eq!(store.get_count("k").await.unwrap(), 0);

        let fresh = store.increment_with_window("k", WINDOW).await.unwrap();
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.ttl_remaining, WINDOW);
    }

    #[tokio::test]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryCounterStore::new());
        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment_with_window("hits", WINDOW).await })
            })
            .collect();
        for task in futures::future::join_all(tasks).await {
            task.unwrap().unwrap();
        }
        assert_eq!(store.get_count("hits").await.unwrap(), 64);
    }

    #[tokio::test]
    async fn reset_drops_counter() {
        let store = MemoryCounterStore::new();
        store.increment_with_window("k", WINDOW).await.unwrap();
        store.reset("k").await.unwrap();
        assert_eq!(store.get_count("k").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lock_is_exclusive_until_ttl() {
        let store = MemoryCounterStore::new();
        let ttl = Duration::from_secs(10);

        let token = store.try_acquire_lock("job", ttl).await.unwrap();
        assert!(token.is_some());
        assert!(store.try_acquire_lock("job", ttl).await.unwrap().is_none());

        // A crashed holder never releases; the TTL frees the key.
        tokio::time::advance(ttl).await;
        assert!(store.try_acquire_lock("job", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn release_requires_matching_token() {
        let store = MemoryCounterStore::new();
        let ttl = Duration::from_secs(10);
        let token = store.try_acquire_lock("job", ttl).await.unwrap().unwrap();

        let stranger = LockToken::from_raw("someone-else");
        assert!(!store.release_lock("job", &stranger).await.unwrap());
        assert!(store.try_acquire_lock("job", ttl).await.unwrap().is_none());

        assert!(store.release_lock("job", &token).await.unwrap());
        assert!(store.try_acquire_lock("job", ttl).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cache_entries_expire() {
        let store = MemoryCounterStore::new();
        store.cache_set("c", "v", Duration::from_secs(5)).await.unwrap();
        assert_eq!(store.cache_get("c").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.cache_get("c").await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn purger_drops_expired_rate_windows() {
        let store = Arc::new(MemoryCounterStore::new());
        for client in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            store
                .increment_with_window(&format!("ratelimit:t:{}", client), Duration::from_secs(60))
                .await
                .unwrap();
        }
        store.cache_set("keep", "v", Duration::from_secs(3_600)).await.unwrap();

        let purger = crate::store::spawn_purger(store.clone(), Duration::from_secs(300));
        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(store.entry_count().await, 1);

        purger.abort();
    }
}
