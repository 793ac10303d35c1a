//! The cache contract and its lock handle.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::distributed::LeaseGuard;
use crate::error::CacheResult;
use crate::memory::LocalGuard;

const PING_KEY: &str = "__ping__";

/// Key/value store with per-entry TTL and per-key mutual exclusion.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Short backend name, shown on the service root.
    fn backend_name(&self) -> &'static str;

    /// Value stored under `key`, or `None` if missing or expired.
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CacheResult<()>;

    /// Acquire the lock of `key`, waiting for the current holder if any.
    async fn lock(&self, key: &str) -> CacheResult<CacheLock>;

    /// Round-trip a sentinel value. Never fails: errors are logged and
    /// reported as `false`.
    async fn ping(&self) -> bool {
        let sentinel = Value::String(uuid::Uuid::new_v4().to_string());
        let round_trip = async {
            self.set(PING_KEY, sentinel.clone(), Duration::from_secs(10))
                .await?;
            self.get(PING_KEY).await
        };
        match round_trip.await {
            Ok(value) => value.as_ref() == Some(&sentinel),
            Err(e) => {
                warn!(backend = self.backend_name(), error = %e, "cache ping failed");
                false
            }
        }
    }
}

/// Typed access on top of the JSON values a [`CacheStore`] holds.
#[async_trait]
pub trait CacheStoreExt: CacheStore {
    async fn get_as<T>(&self, key: &str) -> CacheResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn set_as<T>(&self, key: &str, value: &T, ttl: Duration) -> CacheResult<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)?;
        self.set(key, value, ttl).await
    }
}

impl<C: CacheStore + ?Sized> CacheStoreExt for C {}

/// Held lock on one cache key. Dropping it releases the lock; prefer
/// [`CacheLock::release`] in async code so Redis releases are awaited.
#[must_use = "the lock is released as soon as it is dropped"]
pub struct CacheLock {
    inner: LockInner,
}

enum LockInner {
    Local(LocalGuard),
    Lease(LeaseGuard),
}

impl CacheLock {
    pub(crate) fn local(guard: LocalGuard) -> Self {
        Self {
            inner: LockInner::Local(guard),
        }
    }

    pub(crate) fn lease(guard: LeaseGuard) -> Self {
        Self {
            inner: LockInner::Lease(guard),
        }
    }

    pub async fn release(self) {
        match self.inner {
            LockInner::Local(guard) => drop(guard),
            LockInner::Lease(mut guard) => guard.release().await,
        }
    }
}

impl std::fmt::Debug for CacheLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.inner {
            LockInner::Local(_) => "local",
            LockInner::Lease(_) => "lease",
        };
        f.debug_struct("CacheLock").field("kind", &kind).finish()
    }
}
