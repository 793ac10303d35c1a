//! Route handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use lookout_engine::{Check, CheckInfo, ParallelExecutor};
use lookout_metrics::render_prometheus;
use serde_json::{Value, json};

use crate::ApiState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::CheckLabels;
use crate::render::{OutputFormat, Report, respond};

/// GET /
pub async fn hello(State(state): State<ApiState>) -> Json<Value> {
    let settings = &state.settings;
    let title = if settings.service_title.is_empty() {
        capitalize(&settings.service_name)
    } else {
        settings.service_title.clone()
    };
    Json(json!({
        "hello": "lookout",
        "service": settings.service_name,
        "title": title,
        "environment": settings.env_name,
        "settings": {
            "cache": state.runner.cache().backend_name(),
            "cache_lock_enabled": settings.cache_lock_enabled,
            "limit_request_concurrency": settings.limit_request_concurrency,
            "limit_worker_concurrency": settings.limit_worker_concurrency,
            "limit_checks_concurrency": settings.limit_checks_concurrency,
            "request_max_retries": settings.requests_max_retries,
            "request_timeout_seconds": settings.requests_timeout.as_secs(),
        },
    }))
}

/// GET /__lbheartbeat__
pub async fn lbheartbeat() -> Json<Value> {
    Json(json!({}))
}

/// GET /__heartbeat__
///
/// Only the cache decides the status; the bug tracker is informational.
pub async fn heartbeat(State(state): State<ApiState>) -> Response {
    let bugtracker = if !state.tracker.is_enabled() {
        "disabled"
    } else if state.tracker.ping().await {
        "ok"
    } else {
        "Bug tracker ping failed"
    };
    let cache_ok = state.runner.cache().ping().await;
    let status = if cache_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = json!({
        "bugtracker": bugtracker,
        "cache": if cache_ok { "ok" } else { "cache failing" },
    });
    (status, Json(body)).into_response()
}

/// GET /__version__
pub async fn version(State(state): State<ApiState>) -> ApiResult<Json<Value>> {
    let path = &state.settings.version_file;
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ApiError::Internal(format!("version file {} unreadable: {e}", path.display())))?;
    let version = serde_json::from_str(&content)
        .map_err(|e| ApiError::Internal(format!("version file {} invalid: {e}", path.display())))?;
    Ok(Json(version))
}

/// GET /__metrics__
pub async fn metrics(State(state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        render_prometheus(&state.metrics),
    )
}

/// GET /checks
pub async fn list_checks(State(state): State<ApiState>) -> Json<Vec<CheckInfo>> {
    let infos = state
        .checks
        .all()
        .iter()
        .map(|check| check_info(&state, check))
        .collect();
    Json(infos)
}

/// GET /checks/{project}
pub async fn project_checks(
    State(state): State<ApiState>,
    Path(project): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let format = OutputFormat::negotiate(&headers)?;
    let selected = state.checks.lookup(Some(project.as_str()), None, None)?;
    let reports = run_reports(&state, selected, false).await?;
    Ok(CheckLabels::new(&project, "").attach(respond(format, reports, false)))
}

/// GET /checks/tags/{tags}
pub async fn tags_checks(
    State(state): State<ApiState>,
    Path(tags): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let format = OutputFormat::negotiate(&headers)?;
    let selected = state.checks.lookup(None, None, Some(tags.as_str()))?;
    let reports = run_reports(&state, selected, false).await?;
    Ok(respond(format, reports, false))
}

/// GET /checks/{project}/{name}
///
/// `refresh=<secret>` bypasses the cache. Other query parameters override
/// the check's URL-overridable parameters.
pub async fn check(
    State(state): State<ApiState>,
    Path((project, name)): Path<(String, String)>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let format = OutputFormat::negotiate(&headers)?;
    let selected = state.checks.lookup(Some(project.as_str()), Some(name.as_str()), None)?;
    let Some(selected) = selected.into_iter().next() else {
        return Err(ApiError::Internal(format!("lookup of {project}/{name} returned nothing")));
    };

    let force = match query.get("refresh") {
        None => false,
        Some(secret) if state.settings.refresh_secret.as_deref() == Some(secret.as_str()) => true,
        Some(_) => return Err(ApiError::BadRequest("invalid refresh secret".to_string())),
    };

    let check = Arc::new(selected.override_params(&query)?);
    let reports = run_reports(&state, vec![check], force).await?;
    Ok(CheckLabels::new(&project, &name).attach(respond(format, reports, true)))
}

fn check_info(state: &ApiState, check: &Check) -> CheckInfo {
    check.info(state.settings.troubleshooting_url(&check.project, &check.name))
}

/// Run `checks` under the checks budget and build their reports in input
/// order.
async fn run_reports(
    state: &ApiState,
    checks: Vec<Arc<Check>>,
    force: bool,
) -> ApiResult<Vec<Report>> {
    let futures: Vec<_> = checks
        .iter()
        .map(|check| {
            let runner = state.runner.clone();
            let check = check.clone();
            async move {
                let (project, name) = (check.project.clone(), check.name.clone());
                runner
                    .run(check, force)
                    .await
                    .map_err(|source| ApiError::Run {
                        project,
                        name,
                        source,
                    })
            }
        })
        .collect();
    let results = ParallelExecutor::new(state.checks_limiter.clone())
        .run(futures)
        .await?;

    let mut reports = Vec::with_capacity(results.len());
    for (check, result) in checks.iter().zip(results) {
        let buglist = state.tracker.fetch(&check.project, &check.name).await;
        let history = state.history.fetch(&check.project, &check.name).await;
        reports.push(Report {
            info: check_info(state, check),
            datetime: result.datetime.to_rfc3339(),
            duration: result.duration_ms(),
            success: result.success,
            data: result.data,
            buglist,
            history,
        });
    }
    Ok(reports)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
