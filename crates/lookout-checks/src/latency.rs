use async_trait::async_trait;
use lookout_core::{CheckOutcome, ParamKind, ParamSchema, ParamSpec, Params};
use lookout_engine::{CheckContext, CheckModule};

pub struct Latency;

#[async_trait]
impl CheckModule for Latency {
    fn name(&self) -> &'static str {
        "checks.core.latency"
    }

    fn documentation(&self) -> &'static str {
        "URL should respond under a certain number of milliseconds.\n\nThe latency is returned in milliseconds."
    }

    fn parameters(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::required("url", ParamKind::Str),
            ParamSpec::required("max_milliseconds", ParamKind::Int),
        ])
    }

    fn exposed_parameters(&self) -> &'static [&'static str] {
        &["url", "max_milliseconds"]
    }

    fn default_plot(&self) -> Option<&'static str> {
        Some(".")
    }

    async fn run(&self, ctx: &CheckContext, params: &Params) -> anyhow::Result<CheckOutcome> {
        let url = params.str("url")?;
        let max_milliseconds = params.int("max_milliseconds")?;

        match ctx.fetcher.raw(url, &[]).await {
            Ok(response) => {
                let elapsed = i64::try_from(response.elapsed.as_millis()).unwrap_or(i64::MAX);
                Ok(CheckOutcome::new(elapsed < max_milliseconds, elapsed))
            }
            Err(e) => Ok(CheckOutcome::fail(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{closed_url, context, serve};
    use axum::Router;
    use axum::routing::get;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn params(url: &str, max: i64) -> Params {
        let supplied: BTreeMap<String, Value> =
            serde_json::from_value(json!({"url": url, "max_milliseconds": max})).unwrap();
        Latency.parameters().resolve("checks.core.latency", &supplied).unwrap()
    }

    #[tokio::test]
    async fn elapsed_is_compared_to_max() {
        let base = serve(
            Router::new()
                .route("/fast", get(|| async { "ok" }))
                .route(
                    "/slow",
                    get(|| async {
                        tokio::time::sleep(Duration::from_millis(150)).await;
                        "ok"
                    }),
                ),
        )
        .await;

        let fast = Latency
            .run(&context(None), &params(&format!("{base}/fast"), 1000))
            .await
            .unwrap();
        assert!(fast.success);
        assert!(fast.data.as_i64().unwrap() < 1000);

        let slow = Latency
            .run(&context(None), &params(&format!("{base}/slow"), 100))
            .await
            .unwrap();
        assert!(!slow.success);
        assert!(slow.data.as_i64().unwrap() >= 100);
    }

    #[tokio::test]
    async fn unreachable_url_fails() {
        let outcome = Latency
            .run(&context(None), &params(&closed_url(), 100))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.data.is_string());
    }
}
