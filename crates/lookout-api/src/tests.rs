use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use lookout_cache::{CacheStore, MemoryCache};
use lookout_core::{CheckOutcome, ChecksFile, ParamKind, ParamSchema, ParamSpec, Params, Settings};
use lookout_engine::listeners::register_defaults;
use lookout_engine::{
    CheckContext, CheckModule, CheckRunner, Checks, ConcurrencyLimiter, EventBus, Fetcher,
    ModuleRegistry, RetryPolicy,
};
use lookout_insights::{BugTracker, History};
use lookout_metrics::Metrics;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::*;

const CHECKS: &str = r#"
[checks.core.up]
description = "Always up"
module = "tests.toggle"
tags = ["critical"]

[checks.core.down]
description = "Always down"
module = "tests.toggle"
tags = ["critical", "flaky"]
params = { ok = false }

[checks.other.broken]
description = "Raises"
module = "tests.toggle"
params = { explode = true }
"#;

/// Succeeds according to `ok`; `explode` makes the body error out.
struct Toggle {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl CheckModule for Toggle {
    fn name(&self) -> &'static str {
        "tests.toggle"
    }

    fn documentation(&self) -> &'static str {
        "Succeeds when told to."
    }

    fn parameters(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::optional("ok", ParamKind::Bool, true),
            ParamSpec::optional("explode", ParamKind::Bool, false),
        ])
    }

    fn exposed_parameters(&self) -> &'static [&'static str] {
        &["ok"]
    }

    fn url_parameters(&self) -> &'static [&'static str] {
        &["ok"]
    }

    async fn run(&self, _ctx: &CheckContext, params: &Params) -> anyhow::Result<CheckOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        anyhow::ensure!(!params.bool("explode")?, "boom");
        let ok = params.bool("ok")?;
        Ok(CheckOutcome::new(ok, json!({"ok": ok})))
    }
}

struct Harness {
    router: Router,
    runs: Arc<AtomicUsize>,
}

fn harness(settings: Settings) -> Harness {
    let runs = Arc::new(AtomicUsize::new(0));
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
    let metrics = Arc::new(Metrics::new(&settings.metrics_prefix));
    let fetcher = Fetcher::new(
        Duration::from_secs(1),
        BTreeMap::new(),
        ConcurrencyLimiter::new(2),
        RetryPolicy::new(0),
    )
    .unwrap();
    let context = CheckContext {
        fetcher: fetcher.clone(),
        workers: ConcurrencyLimiter::new(2),
        github_token: None,
    };
    let mut events = EventBus::new();
    register_defaults(&mut events);
    let runner = CheckRunner::new(cache.clone(), Arc::new(events), context, metrics.clone());

    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(Toggle { runs: runs.clone() }));
    let file = ChecksFile::parse(CHECKS, |_| None).unwrap();
    let checks = Checks::from_config(&file, &registry, settings.default_ttl).unwrap();

    let tracker = BugTracker::new(
        fetcher,
        cache.clone(),
        None,
        None,
        &settings.service_name,
        &settings.env_name,
        settings.bugtracker_ttl,
    );
    let state = ApiState {
        settings: Arc::new(settings),
        checks: Arc::new(checks),
        runner,
        tracker,
        history: History::disabled(cache),
        metrics,
        checks_limiter: ConcurrencyLimiter::new(2),
    };
    Harness {
        router: build_router(state),
        runs,
    }
}

async fn get(router: &Router, uri: &str, accept: Option<&str>) -> Response {
    let mut request = Request::builder().uri(uri);
    if let Some(accept) = accept {
        request = request.header(header::ACCEPT, accept);
    }
    router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn hello_shows_settings() {
    let h = harness(Settings::default());
    let response = get(&h.router, "/", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service"], "lookout");
    assert_eq!(body["title"], "Lookout");
    assert_eq!(body["settings"]["cache"], "memory");
    assert_eq!(body["settings"]["limit_checks_concurrency"], 4);
}

#[tokio::test]
async fn heartbeats() {
    let h = harness(Settings::default());
    let response = get(&h.router, "/__lbheartbeat__", None).await;
    assert_eq!(body_json(response).await, json!({}));

    let response = get(&h.router, "/__heartbeat__", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"bugtracker": "disabled", "cache": "ok"})
    );
}

#[tokio::test]
async fn version_file_is_served() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"version": "1.2.0", "commit": "abc"}}"#).unwrap();
    let h = harness(Settings {
        version_file: file.path().to_path_buf(),
        ..Settings::default()
    });
    let response = get(&h.router, "/__version__", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["version"], "1.2.0");

    let missing = harness(Settings {
        version_file: "/nonexistent/version.json".into(),
        ..Settings::default()
    });
    let response = get(&missing.router, "/__version__", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn list_checks_in_configuration_order() {
    let h = harness(Settings {
        troubleshooting_link_template: Some("https://wiki/{project}/{check}".to_string()),
        ..Settings::default()
    });
    let body = body_json(get(&h.router, "/checks", None).await).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["up", "down", "broken"]);
    assert_eq!(body[1]["parameters"], json!({"ok": false}));
    assert_eq!(body[1]["troubleshooting"], "https://wiki/core/down");
    assert_eq!(h.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn single_check_report() {
    let h = harness(Settings::default());
    let response = get(&h.router, "/checks/core/up", Some("application/json")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["project"], "core");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], json!({"ok": true}));
    assert_eq!(body["buglist"], json!([]));
    assert_eq!(body["history"], json!([]));
    assert!(body["duration"].is_u64());
    assert!(body["datetime"].as_str().unwrap().contains('T'));

    get(&h.router, "/checks/core/up", None).await;
    assert_eq!(h.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn project_reports_fail_when_any_check_fails() {
    let h = harness(Settings::default());
    let response = get(&h.router, "/checks/core", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    let outcomes: Vec<(&str, bool)> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|r| (r["name"].as_str().unwrap(), r["success"].as_bool().unwrap()))
        .collect();
    assert_eq!(outcomes, [("up", true), ("down", false)]);
}

#[tokio::test]
async fn tags_select_checks_having_all_of_them() {
    let h = harness(Settings::default());
    let body = body_json(get(&h.router, "/checks/tags/critical+flaky", None).await).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["name"], "down");

    let response = get(&h.router, "/checks/tags/nightly", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_selections_are_not_found() {
    let h = harness(Settings::default());
    for uri in ["/checks/nope", "/checks/core/nope", "/checks/nope/up"] {
        let response = get(&h.router, uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn text_rendering() {
    let h = harness(Settings::default());
    let response = get(&h.router, "/checks/core", Some("text/plain")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let text = body_text(response).await;
    assert!(text.starts_with("core  up    true\ncore  down  false\n\n\ncore  down\n"));
    assert!(text.contains("  Description:\n    Always down"));
}

#[tokio::test]
async fn unsupported_format_is_rejected_before_running() {
    let h = harness(Settings::default());
    let response = get(&h.router, "/checks/core/up", Some("text/html")).await;
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(h.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn refresh_requires_the_secret() {
    let h = harness(Settings {
        refresh_secret: Some("s3cret".to_string()),
        ..Settings::default()
    });
    get(&h.router, "/checks/core/up", None).await;

    let response = get(&h.router, "/checks/core/up?refresh=guess", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(&h.router, "/checks/core/up?refresh=s3cret", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.runs.load(Ordering::SeqCst), 2);

    let unset = harness(Settings::default());
    let response = get(&unset.router, "/checks/core/up?refresh=", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn query_overrides_parameters() {
    let h = harness(Settings::default());
    let response = get(&h.router, "/checks/core/up?ok=no&explode=1", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["data"], json!({"ok": false}));
    assert_eq!(body["parameters"], json!({"ok": false}));

    let response = get(&h.router, "/checks/core/up?ok=maybe", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn check_errors_are_internal_errors() {
    let h = harness(Settings::default());
    let response = get(&h.router, "/checks/other/broken", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["project"], "other");
    assert_eq!(body["name"], "broken");
    assert!(body["data"].as_str().unwrap().contains("boom"));

    let text = body_text(get(&h.router, "/__metrics__", None).await).await;
    assert!(text.contains(
        r#"lookout_request_summary{method="GET",endpoint="/checks/{project}/{name}",status="500",project="other",check="broken"} 1"#
    ));
}

#[tokio::test]
async fn requests_are_counted() {
    let h = harness(Settings::default());
    get(&h.router, "/checks/core/up", None).await;
    let text = body_text(get(&h.router, "/__metrics__", None).await).await;
    assert!(text.contains(
        r#"lookout_request_summary{method="GET",endpoint="/checks/{project}/{name}",status="200",project="core",check="up"} 1"#
    ));
    assert!(text.contains("lookout_check_run_duration_seconds_count"));
}

#[tokio::test]
async fn unknown_checks_share_one_metric_series() {
    let h = harness(Settings::default());
    for i in 0..20 {
        let response = get(&h.router, &format!("/checks/nope{i}/x{i}"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
    let response = get(&h.router, "/checks/nope", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let text = body_text(get(&h.router, "/__metrics__", None).await).await;
    let not_found: Vec<&str> = text
        .lines()
        .filter(|line| line.starts_with("lookout_request_summary{") && line.contains(r#"status="404""#))
        .collect();
    assert_eq!(
        not_found,
        vec![
            r#"lookout_request_summary{method="GET",endpoint="/checks/{project}",status="404",project="",check=""} 1"#,
            r#"lookout_request_summary{method="GET",endpoint="/checks/{project}/{name}",status="404",project="",check=""} 20"#,
        ]
    );
}
