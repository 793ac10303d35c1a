//! Recent scalar history of checks.
//!
//! Rows come from a [`HistorySource`] (typically a store fed by the
//! `check.result` log records) and are grouped per `project/name`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lookout_cache::{CacheStore, CacheStoreExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

const CACHE_KEY: &str = "scalar-history";

/// One recorded execution of a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    /// `project/name`.
    pub check: String,
    pub t: String,
    pub success: bool,
    pub scalar: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub t: String,
    pub success: bool,
    pub scalar: f64,
}

#[async_trait]
pub trait HistorySource: Send + Sync + 'static {
    /// Rows of the last `days` days, oldest first.
    async fn fetch_rows(&self, days: u32) -> anyhow::Result<Vec<HistoryRow>>;
}

/// Source for deployments without a history store.
#[derive(Debug, Default)]
pub struct DisabledHistory;

#[async_trait]
impl HistorySource for DisabledHistory {
    async fn fetch_rows(&self, _days: u32) -> anyhow::Result<Vec<HistoryRow>> {
        Ok(Vec::new())
    }
}

type HistoryMap = BTreeMap<String, Vec<HistoryPoint>>;

#[derive(Clone)]
pub struct History {
    source: Arc<dyn HistorySource>,
    cache: Arc<dyn CacheStore>,
    days: u32,
    ttl: Duration,
}

impl History {
    pub fn new(
        source: Arc<dyn HistorySource>,
        cache: Arc<dyn CacheStore>,
        days: u32,
        ttl: Duration,
    ) -> Self {
        Self {
            source,
            cache,
            days,
            ttl,
        }
    }

    pub fn disabled(cache: Arc<dyn CacheStore>) -> Self {
        Self::new(Arc::new(DisabledHistory), cache, 0, Duration::ZERO)
    }

    pub async fn fetch(&self, project: &str, name: &str) -> Vec<HistoryPoint> {
        if self.days == 0 {
            return Vec::new();
        }
        let mut history = self.load().await;
        history
            .remove(&format!("{project}/{name}"))
            .unwrap_or_default()
    }

    async fn load(&self) -> HistoryMap {
        let lock = match self.cache.lock(CACHE_KEY).await {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!(error = %e, "history lock unavailable");
                None
            }
        };

        let cached = match self.cache.get_as::<HistoryMap>(CACHE_KEY).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "history cache read failed");
                None
            }
        };

        let history = match cached {
            Some(history) => history,
            None => {
                let rows = match self.source.fetch_rows(self.days).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        warn!(error = %format!("{e:#}"), "failed to fetch history");
                        Vec::new()
                    }
                };
                let mut history = HistoryMap::new();
                for row in rows {
                    history.entry(row.check).or_default().push(HistoryPoint {
                        t: row.t,
                        success: row.success,
                        scalar: row.scalar,
                    });
                }
                if let Err(e) = self.cache.set_as(CACHE_KEY, &history, self.ttl).await {
                    warn!(error = %e, "failed to cache history");
                }
                history
            }
        };

        if let Some(lock) = lock {
            lock.release().await;
        }
        history
    }
}
