//! lookout-api — HTTP surface of the lookout service.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/` | Service name, environment and effective settings |
//! | GET | `/__lbheartbeat__` | Liveness |
//! | GET | `/__heartbeat__` | Cache and bug tracker health, 503 if the cache fails |
//! | GET | `/__version__` | Contents of the version file |
//! | GET | `/__metrics__` | Prometheus exposition |
//! | GET | `/checks` | Every configured check |
//! | GET | `/checks/{project}` | Run the checks of a project |
//! | GET | `/checks/tags/{tags}` | Run the checks having all `+`-separated tags |
//! | GET | `/checks/{project}/{name}` | Run one check |
//!
//! Check routes answer JSON, or text when `Accept` asks for `text/plain`,
//! with 200 when every selected check succeeded and 503 otherwise.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod render;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use lookout_core::Settings;
use lookout_engine::{CheckRunner, Checks, ConcurrencyLimiter};
use lookout_insights::{BugTracker, History};
use lookout_metrics::Metrics;

pub use error::{ApiError, ApiResult};
pub use render::{OutputFormat, Report};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub settings: Arc<Settings>,
    pub checks: Arc<Checks>,
    pub runner: CheckRunner,
    pub tracker: BugTracker,
    pub history: History,
    pub metrics: Arc<Metrics>,
    /// Budget for running the checks of one request in parallel.
    pub checks_limiter: ConcurrencyLimiter,
}

/// Build the complete router, request summary included.
pub fn build_router(state: ApiState) -> Router {
    let metrics = state.metrics.clone();
    Router::new()
        .route("/", get(handlers::hello))
        .route("/__lbheartbeat__", get(handlers::lbheartbeat))
        .route("/__heartbeat__", get(handlers::heartbeat))
        .route("/__version__", get(handlers::version))
        .route("/__metrics__", get(handlers::metrics))
        .route("/checks", get(handlers::list_checks))
        .route("/checks/tags/{tags}", get(handlers::tags_checks))
        .route("/checks/{project}", get(handlers::project_checks))
        .route("/checks/{project}/{name}", get(handlers::check))
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(
            metrics,
            middleware::request_summary,
        ))
}

#[cfg(test)]
mod tests;
