//! Cached, single-flight check execution.
//!
//! # Run sequence
//!
//! ```text
//! run(check, force)
//!   ├── cache hit and not forced ──────────────────────► return cached
//!   ├── lock(cache_key)              waits for a running execution
//!   │   ├── re-read: fresh and not forced ─────────────► return cached
//!   │   ├── execute check body, measure duration
//!   │   └── store result (ttl) and last outcome (retention)
//!   ├── release lock
//!   └── emit check:run, and check:state:changed on first failure or flip
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lookout_cache::{CacheError, CacheLock, CacheStore, CacheStoreExt};
use lookout_core::{CheckOutcome, CheckResult};
use lookout_metrics::Metrics;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::check::{Check, CheckContext};
use crate::error::{FetchError, RunError, RunResult};
use crate::events::{CheckEvent, EventBus, EventKind};

/// Default retention of the last known outcome of each cache key.
pub const DEFAULT_OUTCOME_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Clone)]
pub struct CheckRunner {
    cache: Arc<dyn CacheStore>,
    events: Arc<EventBus>,
    context: CheckContext,
    metrics: Arc<Metrics>,
    lock_enabled: bool,
    outcome_retention: Duration,
}

impl std::fmt::Debug for CheckRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRunner")
            .field("cache", &self.cache.backend_name())
            .field("events", &self.events)
            .field("lock_enabled", &self.lock_enabled)
            .finish_non_exhaustive()
    }
}

impl CheckRunner {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        events: Arc<EventBus>,
        context: CheckContext,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            cache,
            events,
            context,
            metrics,
            lock_enabled: true,
            outcome_retention: DEFAULT_OUTCOME_RETENTION,
        }
    }

    pub fn with_lock(mut self, enabled: bool) -> Self {
        self.lock_enabled = enabled;
        self
    }

    pub fn with_outcome_retention(mut self, retention: Duration) -> Self {
        self.outcome_retention = retention;
        self
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn context(&self) -> &CheckContext {
        &self.context
    }

    /// Return the cached result of `check`, executing it if the entry is
    /// missing, expired, or `force` is set.
    pub async fn run(&self, check: Arc<Check>, force: bool) -> RunResult<CheckResult> {
        let key = check.cache_key();

        if !force {
            if let Some(cached) = self.read(&key).await {
                return Ok(cached);
            }
        }

        let lock = self.acquire(&check, &key).await?;

        let current = self.read(&key).await;
        if let Some(cached) = current.as_ref().filter(|_| !force) {
            let cached = cached.clone();
            release(lock).await;
            return Ok(cached);
        }

        let previous = match &current {
            Some(result) => Some(result.success),
            None => self.last_outcome(&key).await,
        };

        let started = Instant::now();
        let executed = check.execute(&self.context).await;
        let duration = started.elapsed().as_secs_f64();
        self.metrics
            .check_run_duration
            .with(&[check.project.as_str(), check.name.as_str()])
            .observe(duration);

        let outcome = match executed {
            Ok(outcome) => outcome,
            Err(err) => match transient_fetch_error(&err) {
                Some(fetch) => {
                    warn!(check = %check.identifier(), error = %fetch, "check failed on transient error");
                    CheckOutcome::fail(Value::String(fetch.to_string()))
                }
                None => {
                    release(lock).await;
                    return Err(RunError::Check {
                        check: check.identifier(),
                        source: err,
                    });
                }
            },
        };

        let result = CheckResult::new(Utc::now(), outcome, duration);
        self.store(&key, &check, &result).await;
        release(lock).await;

        debug!(
            check = %check.identifier(),
            success = result.success,
            duration_ms = result.duration_ms(),
            "check executed"
        );
        self.publish(&check, &result, previous);
        Ok(result)
    }

    async fn acquire(&self, check: &Check, key: &str) -> RunResult<Option<CacheLock>> {
        if !self.lock_enabled {
            return Ok(None);
        }
        let started = Instant::now();
        let lock = match self.cache.lock(key).await {
            Ok(lock) => Some(lock),
            Err(CacheError::LockTimeout { waited, .. }) => {
                return Err(RunError::LockTimeout {
                    check: check.identifier(),
                    waited,
                });
            }
            Err(e) => {
                warn!(check = %check.identifier(), error = %e, "cache lock unavailable, running unlocked");
                None
            }
        };
        self.metrics
            .lock_wait
            .with(&[check.project.as_str(), check.name.as_str()])
            .observe(started.elapsed().as_secs_f64());
        Ok(lock)
    }

    async fn read(&self, key: &str) -> Option<CheckResult> {
        match self.cache.get_as::<CheckResult>(key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "cache read failed");
                None
            }
        }
    }

    async fn last_outcome(&self, key: &str) -> Option<bool> {
        match self.cache.get_as::<bool>(&outcome_key(key)).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(error = %e, "cache read failed");
                None
            }
        }
    }

    async fn store(&self, key: &str, check: &Check, result: &CheckResult) {
        if let Err(e) = self.cache.set_as(key, result, check.ttl).await {
            warn!(check = %check.identifier(), error = %e, "failed to cache check result");
        }
        if let Err(e) = self
            .cache
            .set_as(&outcome_key(key), &result.success, self.outcome_retention)
            .await
        {
            warn!(check = %check.identifier(), error = %e, "failed to record last outcome");
        }
    }

    fn publish(&self, check: &Arc<Check>, result: &CheckResult, previous: Option<bool>) {
        let mut event = CheckEvent {
            kind: EventKind::CheckRun,
            check: check.clone(),
            result: result.outcome(),
        };
        self.events.emit(&event);

        let first_failure = previous.is_none() && !result.success;
        let changed = previous.is_some_and(|p| p != result.success);
        if first_failure || changed {
            event.kind = EventKind::CheckStateChanged;
            self.events.emit(&event);
        }
    }
}

fn outcome_key(key: &str) -> String {
    format!("{key}#last-outcome")
}

async fn release(lock: Option<CacheLock>) {
    if let Some(lock) = lock {
        lock.release().await;
    }
}

fn transient_fetch_error(err: &anyhow::Error) -> Option<&FetchError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<FetchError>())
        .filter(|fetch| fetch.is_transient())
}
