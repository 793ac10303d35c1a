//! In-process cache backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::trace;

use crate::error::CacheResult;
use crate::store::{CacheLock, CacheStore};

type KeyLocks = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Process-local cache. Expiry is checked on read, and expired entries are
/// swept on every write.
///
/// Per-key locks live only while someone holds or waits for them.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (Instant, Value)>>,
    locks: KeyLocks,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, (Instant, Value)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock_map(&self.locks).entry(key.to_string()).or_default().clone()
    }
}

fn lock_map(locks: &KeyLocks) -> MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Held per-key lock of a [`MemoryCache`]. Removes the key's mutex from the
/// map on drop once nobody else references it.
pub(crate) struct LocalGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    locks: KeyLocks,
}

impl Drop for LocalGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = lock_map(&self.locks);
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let mut entries = self.entries();
        let Some((expires, value)) = entries.get(key) else {
            return Ok(None);
        };
        if *expires <= Instant::now() {
            trace!(key, "cache entry expired");
            entries.remove(key);
            return Ok(None);
        }
        Ok(Some(value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CacheResult<()> {
        let now = Instant::now();
        {
            let mut entries = self.entries();
            entries.retain(|_, (expires, _)| *expires > now);
            entries.insert(key.to_string(), (now + ttl, value));
        }
        // Waiters that were cancelled leave their mutex behind.
        lock_map(&self.locks).retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(())
    }

    async fn lock(&self, key: &str) -> CacheResult<CacheLock> {
        let guard = self.key_lock(key).lock_owned().await;
        Ok(CacheLock::local(LocalGuard {
            guard: Some(guard),
            key: key.to_string(),
            locks: self.locks.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn entries_expire_at_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("core/heartbeat-", json!({"ok": true}), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("core/heartbeat-").await.unwrap(), Some(json!({"ok": true})));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("core/heartbeat-").await.unwrap(), None);
        assert!(cache.entries().is_empty());
    }

    #[tokio::test]
    async fn set_overwrites() {
        let cache = MemoryCache::new();
        cache.set("k", json!(1), Duration::from_secs(60)).await.unwrap();
        cache.set("k", json!(2), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn lock_serializes_holders_of_the_same_key() {
        let cache = Arc::new(MemoryCache::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            tasks.push(tokio::spawn(async move {
                let lock = cache.lock("same").await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                lock.release().await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn locks_of_different_keys_are_independent() {
        let cache = MemoryCache::new();
        let first = cache.lock("a").await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(1), cache.lock("b")).await;
        assert!(second.is_ok());
        drop(first);
    }

    #[tokio::test]
    async fn dropped_lock_is_released() {
        let cache = MemoryCache::new();
        drop(cache.lock("a").await.unwrap());
        let again = tokio::time::timeout(Duration::from_secs(1), cache.lock("a")).await;
        assert!(again.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn writes_sweep_expired_entries() {
        let cache = MemoryCache::new();
        for i in 0..10 {
            cache
                .set(&format!("core/deployed-{i}"), json!(i), Duration::from_secs(1))
                .await
                .unwrap();
        }
        tokio::time::advance(Duration::from_secs(2)).await;
        cache.set("core/heartbeat-", json!(true), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.entries().len(), 1);
    }

    #[tokio::test]
    async fn released_locks_leave_no_entry_behind() {
        let cache = Arc::new(MemoryCache::new());
        for i in 0..10 {
            cache.lock(&format!("core/deployed-{i}")).await.unwrap().release().await;
        }
        assert!(lock_map(&cache.locks).is_empty());

        let held = cache.lock("core/heartbeat").await.unwrap();
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.lock("core/heartbeat").await.unwrap() })
        };
        tokio::task::yield_now().await;
        held.release().await;
        let second = waiter.await.unwrap();
        assert_eq!(lock_map(&cache.locks).len(), 1);
        second.release().await;
        assert!(lock_map(&cache.locks).is_empty());
    }
}
