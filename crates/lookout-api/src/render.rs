//! Check reports and their JSON or plain-text rendering.

use axum::Json;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use lookout_engine::CheckInfo;
use lookout_insights::{BugInfo, HistoryPoint};
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;

/// Check info plus the result of its latest run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    #[serde(flatten)]
    pub info: CheckInfo,
    pub datetime: String,
    /// Milliseconds.
    pub duration: u64,
    pub success: bool,
    pub data: Value,
    pub buglist: Vec<BugInfo>,
    pub history: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Text,
}

impl OutputFormat {
    /// Text only when asked for explicitly. Without `Accept` the client gets
    /// JSON.
    pub fn negotiate(headers: &HeaderMap) -> Result<Self, ApiError> {
        let accepts: Vec<&str> = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if accepts.is_empty() {
            return Ok(Self::Json);
        }
        let accepts = accepts.join(",");
        if accepts.contains("text/plain") {
            Ok(Self::Text)
        } else if accepts.contains("*/*") || accepts.contains("application/json") {
            Ok(Self::Json)
        } else {
            Err(ApiError::NotAcceptable)
        }
    }
}

/// 200 if every report succeeded, 503 otherwise. A single report renders
/// as an object in JSON.
pub fn respond(format: OutputFormat, reports: Vec<Report>, single: bool) -> Response {
    let status = if reports.iter().all(|r| r.success) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    match format {
        OutputFormat::Text => (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            render_text(&reports),
        )
            .into_response(),
        OutputFormat::Json if single && reports.len() == 1 => {
            (status, Json(&reports[0])).into_response()
        }
        OutputFormat::Json => (status, Json(reports)).into_response(),
    }
}

/// One aligned `project name success` line per report, then the details of
/// every failing one.
pub fn render_text(reports: &[Report]) -> String {
    let project_width = reports.iter().map(|r| r.info.project.len()).max().unwrap_or(0) + 2;
    let name_width = reports.iter().map(|r| r.info.name.len()).max().unwrap_or(0) + 2;

    let mut text = reports
        .iter()
        .map(|r| {
            format!(
                "{:<project_width$}{:<name_width$}{}",
                r.info.project, r.info.name, r.success
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    for report in reports.iter().filter(|r| !r.success) {
        let info = &report.info;
        text.push_str(&format!("\n\n\n{}  {}\n", info.project, info.name));

        let parameters = serde_json::to_string(&info.parameters).unwrap_or_default();
        let data = serde_json::to_string_pretty(&report.data).unwrap_or_default();
        let fields = [
            ("Url", info.url.as_str()),
            ("Description", info.description.as_str()),
            ("Documentation", info.documentation.as_str()),
            ("Parameters", parameters.as_str()),
            ("Data", data.as_str()),
            ("Troubleshooting", info.troubleshooting.as_deref().unwrap_or_default()),
        ];
        let details: Vec<String> = fields
            .iter()
            .flat_map(|(label, content)| [format!("  {label}:"), indent(content, "    ")])
            .collect();
        text.push_str(&details.join("\n"));
    }
    text
}

fn indent(content: &str, prefix: &str) -> String {
    content
        .lines()
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{prefix}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use lookout_core::Params;
    use serde_json::json;

    fn report(project: &str, name: &str, success: bool) -> Report {
        Report {
            info: CheckInfo {
                name: name.to_string(),
                project: project.to_string(),
                module: "checks.core.heartbeat".to_string(),
                tags: vec![],
                description: "Service is up".to_string(),
                documentation: "URL should return a 200 response.".to_string(),
                url: format!("/checks/{project}/{name}"),
                ttl: 60,
                parameters: Params::from_iter([("url".to_string(), json!("http://svc"))]),
                troubleshooting: None,
            },
            datetime: "2026-01-01T00:00:00+00:00".to_string(),
            duration: 12,
            success,
            data: json!({"status": "down"}),
            buglist: vec![],
            history: vec![],
        }
    }

    fn accept(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn negotiation() {
        assert_eq!(OutputFormat::negotiate(&HeaderMap::new()).unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::negotiate(&accept("*/*")).unwrap(), OutputFormat::Json);
        assert_eq!(
            OutputFormat::negotiate(&accept("text/plain, application/json")).unwrap(),
            OutputFormat::Text
        );
        assert!(matches!(
            OutputFormat::negotiate(&accept("text/html")),
            Err(ApiError::NotAcceptable)
        ));
    }

    #[test]
    fn text_is_aligned_with_failure_details() {
        let text = render_text(&[report("core", "heartbeat", true), report("remote", "up", false)]);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("core    heartbeat  true"));
        assert_eq!(lines.next(), Some("remote  up         false"));
        assert!(text.contains("\n\n\nremote  up\n  Url:\n    /checks/remote/up\n"));
        assert!(text.contains("  Data:\n    {\n      \"status\": \"down\"\n    }"));
        assert!(text.contains("  Parameters:\n    {\"url\":\"http://svc\"}"));
        assert!(text.ends_with("  Troubleshooting:\n"));
        assert!(!text.contains("core  heartbeat\n"));
    }

    #[test]
    fn report_flattens_check_info() {
        let value = serde_json::to_value(report("core", "heartbeat", true)).unwrap();
        assert_eq!(value["project"], "core");
        assert_eq!(value["duration"], 12);
        assert_eq!(value["parameters"]["url"], "http://svc");
        assert!(value["buglist"].as_array().unwrap().is_empty());
    }

    #[test]
    fn status_reflects_every_report() {
        let ok = respond(OutputFormat::Json, vec![report("a", "b", true)], true);
        assert_eq!(ok.status(), StatusCode::OK);
        let failing = respond(
            OutputFormat::Text,
            vec![report("a", "b", true), report("a", "c", false)],
            false,
        );
        assert_eq!(failing.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
