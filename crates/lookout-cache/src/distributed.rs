//! Redis cache backend.
//!
//! Uses `redis::aio::ConnectionManager` for a multiplexed, reconnecting
//! connection shared by every caller. Keys are versioned and hashed so raw
//! keys (which may carry secret parameter values) never reach Redis.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::store::{CacheLock, CacheStore};

const KEY_VERSION: &str = "v1";

/// Deletes the lock key only if it still holds our token, so an expired
/// lease that someone else re-acquired is left alone.
static RELEASE_SCRIPT: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r#"
        if redis.call("GET", KEYS[1]) == ARGV[1] then
            return redis.call("DEL", KEYS[1])
        else
            return 0
        end
        "#,
    )
});

/// Redis-backed cache with a lease-based distributed lock.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    prefix: String,
    lease: Duration,
    blocking_timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("prefix", &self.prefix)
            .field("lease", &self.lease)
            .field("blocking_timeout", &self.blocking_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to `url`. Fails if the server cannot be reached.
    pub async fn connect(
        url: &str,
        prefix: &str,
        lease: Duration,
        blocking_timeout: Duration,
    ) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            CacheError::Connection(format!("failed to create Redis client: {e}"))
        })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Connection(format!("failed to connect to Redis: {e}")))?;

        debug!(url = %redact_url(url), prefix, "redis cache connected");

        Ok(Self {
            conn,
            prefix: prefix.to_string(),
            lease,
            blocking_timeout,
            poll_interval: Duration::from_millis(100),
        })
    }

    /// `{prefix}:v1:{sha256(key)}`
    fn hashed_key(&self, key: &str) -> String {
        let digest = Sha256::digest(key.as_bytes());
        format!("{}:{KEY_VERSION}:{}", self.prefix, hex::encode(digest))
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(format!("{}:data", self.hashed_key(key)))
            .query_async(&mut conn)
            .await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let ttl_ms = (ttl.as_millis() as u64).max(1);
        let encoded = serde_json::to_string(&value)?;
        let _: () = redis::cmd("SET")
            .arg(format!("{}:data", self.hashed_key(key)))
            .arg(encoded)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn lock(&self, key: &str) -> CacheResult<CacheLock> {
        let mut conn = self.conn.clone();
        let lock_key = format!("{}:lock", self.hashed_key(key));
        let token = uuid::Uuid::new_v4().to_string();
        let lease_ms = (self.lease.as_millis() as u64).max(1);
        let started = Instant::now();
        let deadline = started + self.blocking_timeout;

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&lock_key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(lease_ms)
                .query_async(&mut conn)
                .await?;
            if acquired.is_some() {
                return Ok(CacheLock::lease(LeaseGuard {
                    conn,
                    key: lock_key,
                    token,
                    released: false,
                }));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CacheError::LockTimeout {
                    key: lock_key,
                    waited: now - started,
                });
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

/// A held Redis lock lease.
pub(crate) struct LeaseGuard {
    conn: ConnectionManager,
    key: String,
    token: String,
    released: bool,
}

impl LeaseGuard {
    pub(crate) async fn release(&mut self) {
        if self.released {
            return;
        }
        // Marked only once the script has run: if this future is dropped
        // mid-release, `Drop` still deletes the lease.
        release_lease(self.conn.clone(), &self.key, &self.token).await;
        self.released = true;
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Dropped without an explicit release (e.g. cancelled): release in
        // the background, or let the lease expire if no runtime is left.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let conn = self.conn.clone();
            let key = std::mem::take(&mut self.key);
            let token = std::mem::take(&mut self.token);
            handle.spawn(async move { release_lease(conn, &key, &token).await });
        }
    }
}

async fn release_lease(mut conn: ConnectionManager, key: &str, token: &str) {
    let result: redis::RedisResult<i64> = RELEASE_SCRIPT
        .key(key)
        .arg(token)
        .invoke_async(&mut conn)
        .await;
    match result {
        Ok(0) => warn!(key, "lock lease had already expired"),
        Ok(_) => {}
        Err(e) => warn!(key, error = %e, "failed to release lock"),
    }
}

/// Redact the password of a Redis URL for logging.
pub fn redact_url(url: &str) -> String {
    let Some(authority) = url.find("://").map(|i| i + 3) else {
        return url.to_string();
    };
    let rest = &url[authority..];
    if let Some(at_pos) = rest.find('@') {
        if let Some(colon_pos) = rest[..at_pos].find(':') {
            return format!(
                "{}{}:***{}",
                &url[..authority],
                &rest[..colon_pos],
                &rest[at_pos..]
            );
        }
    }
    url.to_string()
}
