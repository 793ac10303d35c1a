use std::collections::BTreeMap;

use async_trait::async_trait;
use lookout_core::{CheckOutcome, ParamKind, ParamSchema, ParamSpec, Params};
use lookout_engine::{CheckContext, CheckModule};
use serde_json::json;

pub struct Headers;

#[async_trait]
impl CheckModule for Headers {
    fn name(&self) -> &'static str {
        "checks.core.headers"
    }

    fn documentation(&self) -> &'static str {
        "Certain response headers should be received when certain request headers are sent.\n\n\
         Returns missing headers by URL if failing."
    }

    fn parameters(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::required("urls", ParamKind::StrList),
            ParamSpec::optional("request_headers", ParamKind::StrMap, json!({})),
            ParamSpec::required("response_headers", ParamKind::StrMap),
        ])
    }

    fn exposed_parameters(&self) -> &'static [&'static str] {
        &["urls", "request_headers", "response_headers"]
    }

    async fn run(&self, ctx: &CheckContext, params: &Params) -> anyhow::Result<CheckOutcome> {
        let urls = params.str_list("urls")?;
        let request_headers: Vec<(String, String)> =
            params.str_map("request_headers")?.into_iter().collect();
        let expected = params.str_map("response_headers")?;

        let futures: Vec<_> = urls
            .iter()
            .map(|url| {
                let fetcher = ctx.fetcher.clone();
                let url = url.clone();
                let request_headers = request_headers.clone();
                async move {
                    let headers: Vec<(&str, &str)> = request_headers
                        .iter()
                        .map(|(k, v)| (k.as_str(), v.as_str()))
                        .collect();
                    let (_status, received) = fetcher.head(&url, &headers).await?;
                    Ok::<_, anyhow::Error>(received)
                }
            })
            .collect();
        let responses = ctx.parallel().run(futures).await?;

        // Empty expected values only require the header to be present.
        let mut missing: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        for (url, received) in urls.iter().zip(responses) {
            for (name, value) in &expected {
                let matches = received
                    .get(&name.to_ascii_lowercase())
                    .is_some_and(|got| value.is_empty() || got == value);
                if !matches {
                    missing
                        .entry(url.clone())
                        .or_default()
                        .insert(name.clone(), value.clone());
                }
            }
        }

        Ok(CheckOutcome::new(missing.is_empty(), serde_json::to_value(missing)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{closed_url, context, serve};
    use axum::Router;
    use axum::http::HeaderMap;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use serde_json::Value;

    async fn negotiated(headers: HeaderMap) -> impl IntoResponse {
        let gzip = headers
            .get("accept-encoding")
            .is_some_and(|v| v.to_str().unwrap_or_default().contains("gzip"));
        let mut response = HeaderMap::new();
        if gzip {
            response.insert("content-encoding", "gzip".parse().unwrap());
        }
        response.insert("x-frame-options", "DENY".parse().unwrap());
        (response, "")
    }

    fn params(values: Value) -> Params {
        let supplied: BTreeMap<String, Value> = serde_json::from_value(values).unwrap();
        Headers.parameters().resolve("checks.core.headers", &supplied).unwrap()
    }

    #[tokio::test]
    async fn reports_missing_headers_by_url() {
        let base = serve(
            Router::new()
                .route("/a", get(negotiated))
                .route("/b", get(|| async { "" })),
        )
        .await;
        let a = format!("{base}/a");
        let b = format!("{base}/b");

        let outcome = Headers
            .run(
                &context(None),
                &params(json!({
                    "urls": [a.clone(), b.clone()],
                    "request_headers": {"Accept-Encoding": "gzip"},
                    "response_headers": {"Content-Encoding": "gzip", "X-Frame-Options": ""},
                })),
            )
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(
            outcome.data,
            json!({b: {"Content-Encoding": "gzip", "X-Frame-Options": ""}})
        );
    }

    #[tokio::test]
    async fn all_headers_present() {
        let base = serve(Router::new().route("/a", get(negotiated))).await;
        let outcome = Headers
            .run(
                &context(None),
                &params(json!({
                    "urls": format!("{base}/a"),
                    "request_headers": "{\"Accept-Encoding\": \"gzip\"}",
                    "response_headers": {"Content-Encoding": "gzip"},
                })),
            )
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.data, json!({}));
    }

    #[tokio::test]
    async fn unreachable_url_is_an_error() {
        let result = Headers
            .run(
                &context(None),
                &params(json!({
                    "urls": [closed_url()],
                    "response_headers": {"Server": ""},
                })),
            )
            .await;
        let err = result.unwrap_err();
        assert!(err.downcast_ref::<lookout_engine::FetchError>().is_some());
    }
}
