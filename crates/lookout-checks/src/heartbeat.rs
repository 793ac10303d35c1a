use async_trait::async_trait;
use lookout_core::{CheckOutcome, ParamKind, ParamSchema, ParamSpec, Params};
use lookout_engine::{CheckContext, CheckModule};
use serde_json::Value;

pub struct Heartbeat;

#[async_trait]
impl CheckModule for Heartbeat {
    fn name(&self) -> &'static str {
        "checks.core.heartbeat"
    }

    fn documentation(&self) -> &'static str {
        "URL should return the expected status.\n\nThe remote response is returned."
    }

    fn parameters(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::required("url", ParamKind::Str),
            ParamSpec::optional("expected_status", ParamKind::Int, 200),
        ])
    }

    fn exposed_parameters(&self) -> &'static [&'static str] {
        &["url", "expected_status"]
    }

    async fn run(&self, ctx: &CheckContext, params: &Params) -> anyhow::Result<CheckOutcome> {
        let url = params.str("url")?;
        let expected = params.int("expected_status")?;

        let response = match ctx.fetcher.raw(url, &[]).await {
            Ok(response) => response,
            Err(e) => return Ok(CheckOutcome::fail(e.to_string())),
        };
        let success = i64::from(response.status) == expected;

        let is_json = response
            .header("content-type")
            .is_some_and(|ct| ct.contains("application/json"));
        let data = if is_json {
            serde_json::from_slice(&response.body)
                .unwrap_or_else(|_| Value::String(response.text()))
        } else {
            Value::String(response.text())
        };
        Ok(CheckOutcome::new(success, data))
    }
}
