//! Per-request summary record and request metrics.

use std::sync::Arc;

use axum::extract::{MatchedPath, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use lookout_metrics::Metrics;
use tokio::time::Instant;
use tracing::info;

pub async fn request_summary(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let querystring = redact_querystring(request.uri().query().unwrap_or_default());
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let headers = request.headers();
    let agent = header(headers, "user-agent");
    let lang = header(headers, "accept-language");
    let rid = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    let response = next.run(request).await;

    let elapsed = started.elapsed();
    let status = response.status().as_u16();
    let resolved = response.extensions().get::<CheckLabels>().cloned().unwrap_or_default();

    info!(
        target: "request.summary",
        time = %Utc::now().to_rfc3339(),
        agent = agent.as_deref(),
        path = %path,
        method = %method,
        lang = lang.as_deref(),
        querystring = %querystring,
        errno = if status >= 500 { 999 } else { 0 },
        rid = %rid,
        code = status,
        t = elapsed.as_millis() as u64,
    );

    let status = status.to_string();
    let labels = [
        method.as_str(),
        endpoint.as_str(),
        status.as_str(),
        resolved.project.as_str(),
        resolved.check.as_str(),
    ];
    metrics
        .request_duration
        .with(&labels)
        .observe(elapsed.as_secs_f64());
    metrics.request_summary.with(&labels).inc();

    response
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Project and check a handler resolved from the configuration, attached
/// to its response. Requests without one are counted with empty labels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckLabels {
    pub project: String,
    pub check: String,
}

impl CheckLabels {
    pub fn new(project: &str, check: &str) -> Self {
        Self {
            project: project.to_string(),
            check: check.to_string(),
        }
    }

    pub fn attach(self, mut response: Response) -> Response {
        response.extensions_mut().insert(self);
        response
    }
}

/// Query string with the `refresh` secret masked.
fn redact_querystring(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some(("refresh", _)) => "refresh=***",
            _ => pair,
        })
        .collect::<Vec<_>>()
        .join("&")
}
