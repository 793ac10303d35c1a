//! Assembly of the service from its settings.

use std::sync::Arc;

use anyhow::Context;
use lookout_api::ApiState;
use lookout_cache::{CacheStore, MemoryCache, RedisCache, redact_url};
use lookout_checks::builtin_modules;
use lookout_core::{ChecksFile, Settings};
use lookout_engine::listeners::register_defaults;
use lookout_engine::{CheckContext, CheckRunner, Checks, EventBus, Fetcher, Limits, RetryPolicy};
use lookout_insights::{BugTracker, DisabledHistory, History};
use lookout_metrics::Metrics;
use tracing::info;

/// Every long-lived component of the service.
pub struct Services {
    pub settings: Arc<Settings>,
    pub checks: Arc<Checks>,
    pub runner: CheckRunner,
    pub tracker: BugTracker,
    pub history: History,
    pub metrics: Arc<Metrics>,
    pub limits: Limits,
}

impl Services {
    pub async fn build(settings: Settings) -> anyhow::Result<Self> {
        let metrics = Arc::new(Metrics::new(&settings.metrics_prefix));
        let cache = connect_cache(&settings).await?;

        let limits = Limits::new(
            settings.limit_request_concurrency,
            settings.limit_worker_concurrency,
            settings.limit_checks_concurrency,
            &metrics,
        );
        let fetcher = Fetcher::new(
            settings.requests_timeout,
            settings.default_request_headers.clone(),
            limits.request.clone(),
            RetryPolicy::new(settings.requests_max_retries),
        )
        .context("building HTTP client")?;

        let file = ChecksFile::from_file(&settings.config_file)
            .with_context(|| format!("loading {}", settings.config_file.display()))?;
        let checks = Checks::from_config(&file, &builtin_modules(), settings.default_ttl)?;
        info!(
            checks = checks.all().len(),
            cache = cache.backend_name(),
            "checks loaded"
        );

        let context = CheckContext {
            fetcher: fetcher.clone(),
            workers: limits.worker.clone(),
            github_token: settings.github_token.clone(),
        };
        let mut events = EventBus::new();
        register_defaults(&mut events);
        let runner = CheckRunner::new(cache.clone(), Arc::new(events), context, metrics.clone())
            .with_lock(settings.cache_lock_enabled);

        let tracker = BugTracker::new(
            fetcher,
            cache.clone(),
            settings.bugtracker_url.clone(),
            settings.bugtracker_api_key.clone(),
            &settings.service_name,
            &settings.env_name,
            settings.bugtracker_ttl,
        );
        let history = History::new(
            Arc::new(DisabledHistory),
            cache,
            settings.history_days,
            settings.history_ttl,
        );

        Ok(Self {
            settings: Arc::new(settings),
            checks: Arc::new(checks),
            runner,
            tracker,
            history,
            metrics,
            limits,
        })
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            settings: self.settings.clone(),
            checks: self.checks.clone(),
            runner: self.runner.clone(),
            tracker: self.tracker.clone(),
            history: self.history.clone(),
            metrics: self.metrics.clone(),
            checks_limiter: self.limits.checks.clone(),
        }
    }
}

/// Redis when a URL is configured, in which case it must be reachable.
async fn connect_cache(settings: &Settings) -> anyhow::Result<Arc<dyn CacheStore>> {
    match &settings.redis_cache_url {
        Some(url) => {
            let cache = RedisCache::connect(
                url,
                &settings.redis_key_prefix,
                settings.redis_lock_timeout,
                settings.redis_lock_blocking_timeout,
            )
            .await
            .with_context(|| format!("connecting to {}", redact_url(url)))?;
            info!(url = %redact_url(url), "using redis cache");
            Ok(Arc::new(cache))
        }
        None => Ok(Arc::new(MemoryCache::new())),
    }
}
