//! Known bugs associated with checks.
//!
//! Bugs are matched through their whiteboard: a bug whose whiteboard holds
//! `"<service> <env>"` belongs to this deployment, and it is attached to
//! every check whose `project/name` also appears there.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lookout_cache::{CacheStore, CacheStoreExt};
use lookout_engine::Fetcher;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

const CACHE_KEY: &str = "bugtracker-list";
const API_KEY_HEADER: &str = "X-BUGZILLA-API-KEY";
const HOT_MAX_HOURS: i64 = 240;
const COLD_MIN_HOURS: i64 = 720;

/// A bug as attached to a check report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugInfo {
    pub id: u64,
    /// Empty for bugs in confidential groups.
    pub summary: String,
    pub open: bool,
    pub status: String,
    pub last_update: String,
    /// `hot`, `cold` or empty.
    pub heat: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct RawBug {
    id: u64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    groups: Vec<Value>,
    #[serde(default)]
    is_open: bool,
    #[serde(default)]
    status: String,
    #[serde(default)]
    last_change_time: String,
    #[serde(default)]
    whiteboard: String,
}

#[derive(Clone)]
pub struct BugTracker {
    fetcher: Fetcher,
    cache: Arc<dyn CacheStore>,
    url: Option<String>,
    api_key: String,
    whiteboard: String,
    ttl: Duration,
}

impl std::fmt::Debug for BugTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BugTracker")
            .field("url", &self.url)
            .field("whiteboard", &self.whiteboard)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl BugTracker {
    pub fn new(
        fetcher: Fetcher,
        cache: Arc<dyn CacheStore>,
        url: Option<String>,
        api_key: Option<String>,
        service_name: &str,
        env_name: &str,
        ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            cache,
            url: url.map(|u| u.trim_end_matches('/').to_string()),
            api_key: api_key.unwrap_or_default(),
            whiteboard: format!("{service_name} {env_name}"),
            ttl,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    /// True if the tracker's `whoami` endpoint answers with a user name.
    pub async fn ping(&self) -> bool {
        let Some(url) = &self.url else {
            return false;
        };
        match self
            .fetcher
            .json(&format!("{url}/rest/whoami"), &[(API_KEY_HEADER, &self.api_key)])
            .await
        {
            Ok(body) => body.get("name").is_some(),
            Err(e) => {
                warn!(error = %e, "bug tracker ping failed");
                false
            }
        }
    }

    /// Bugs of `project/name`, open first then most recently changed.
    pub async fn fetch(&self, project: &str, name: &str) -> Vec<BugInfo> {
        let Some(url) = &self.url else {
            return Vec::new();
        };
        let buglist = self.buglist(url).await;
        let check = format!("{project}/{name}");
        let now = Utc::now();

        let mut bugs: Vec<RawBug> = buglist
            .get("bugs")
            .and_then(Value::as_array)
            .map(|bugs| {
                bugs.iter()
                    .filter_map(|bug| serde_json::from_value::<RawBug>(bug.clone()).ok())
                    .filter(|bug| bug.whiteboard.contains(&check))
                    .collect()
            })
            .unwrap_or_default();
        bugs.sort_by(|a, b| {
            (b.is_open, &b.last_change_time).cmp(&(a.is_open, &a.last_change_time))
        });

        bugs.into_iter()
            .map(|bug| BugInfo {
                id: bug.id,
                summary: if bug.groups.is_empty() {
                    bug.summary
                } else {
                    String::new()
                },
                open: bug.is_open,
                status: bug.status,
                heat: heat(&bug.last_change_time, now).to_string(),
                last_update: bug.last_change_time,
                url: format!("{url}/{}", bug.id),
            })
            .collect()
    }

    /// The deployment-wide bug list, read through the cache. Fetch failures
    /// cache an empty list.
    async fn buglist(&self, url: &str) -> Value {
        let lock = match self.cache.lock(CACHE_KEY).await {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!(error = %e, "bug list lock unavailable");
                None
            }
        };

        let cached = match self.cache.get(CACHE_KEY).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "bug list cache read failed");
                None
            }
        };

        let buglist = match cached {
            Some(buglist) => buglist,
            None => {
                let query = format!("{url}/rest/bug?whiteboard={}", self.whiteboard);
                let fetched = match self
                    .fetcher
                    .json(&query, &[(API_KEY_HEADER, &self.api_key)])
                    .await
                {
                    Ok(body) if body.get("bugs").is_some_and(Value::is_array) => body,
                    Ok(_) => {
                        warn!("bug tracker response has no bug list");
                        json!({"bugs": []})
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to fetch bug list");
                        json!({"bugs": []})
                    }
                };
                if let Err(e) = self.cache.set_as(CACHE_KEY, &fetched, self.ttl).await {
                    warn!(error = %e, "failed to cache bug list");
                }
                fetched
            }
        };

        if let Some(lock) = lock {
            lock.release().await;
        }
        buglist
    }
}

/// `hot` when changed in the last 10 days, `cold` when untouched for 30.
fn heat(last_change: &str, now: DateTime<Utc>) -> &'static str {
    let Ok(changed) = DateTime::parse_from_rfc3339(last_change) else {
        return "";
    };
    let age_hours = (now - changed.with_timezone(&Utc)).num_hours();
    if age_hours < HOT_MAX_HOURS {
        "hot"
    } else if age_hours > COLD_MIN_HOURS {
        "cold"
    } else {
        ""
    }
}
