use anyhow::{Context, anyhow};
use async_trait::async_trait;
use lookout_core::{CheckOutcome, ParamKind, ParamSchema, ParamSpec, Params};
use lookout_engine::{CheckContext, CheckModule};
use serde_json::{Value, json};

const GITHUB_API: &str = "https://api.github.com";

pub struct DeployedVersion;

#[async_trait]
impl CheckModule for DeployedVersion {
    fn name(&self) -> &'static str {
        "checks.core.deployed_version"
    }

    fn documentation(&self) -> &'static str {
        "The deployed `version` should be the latest tag of the specified `repo`.\n\n\
         The deployed version and the latest tag are returned."
    }

    fn parameters(&self) -> ParamSchema {
        ParamSchema::new(vec![
            ParamSpec::required("server", ParamKind::Str),
            ParamSpec::required("repo", ParamKind::Str),
            ParamSpec::optional("github_api", ParamKind::Str, GITHUB_API),
        ])
    }

    fn exposed_parameters(&self) -> &'static [&'static str] {
        &["server", "repo"]
    }

    fn url_parameters(&self) -> &'static [&'static str] {
        &["server"]
    }

    async fn run(&self, ctx: &CheckContext, params: &Params) -> anyhow::Result<CheckOutcome> {
        let server = params.str("server")?.trim_end_matches('/');
        let repo = params.str("repo")?;
        let github_api = params.str("github_api")?.trim_end_matches('/');

        let version_info = ctx
            .fetcher
            .json(&format!("{server}/__version__"), &[])
            .await
            .with_context(|| format!("fetching version of {server}"))?;

        let authorization = ctx.github_token.as_ref().map(|t| format!("token {t}"));
        let headers: Vec<(&str, &str)> = authorization
            .as_deref()
            .map(|value| ("Authorization", value))
            .into_iter()
            .collect();
        let release = ctx
            .fetcher
            .json(&format!("{github_api}/repos/{repo}/releases/latest"), &headers)
            .await
            .with_context(|| format!("fetching latest release of {repo}"))?;

        let deployed_version = string_field(&version_info, "version")?;
        let latest_tag = string_field(&release, "tag_name")?;

        // `1.2.0-rc1` is a deployment of tag `1.2.0`, `1.20.0` is not.
        let success = format!("{deployed_version}-").starts_with(&format!("{latest_tag}-"));
        Ok(CheckOutcome::new(
            success,
            json!({"latest_tag": latest_tag, "deployed_version": deployed_version}),
        ))
    }
}

fn string_field<'a>(body: &'a Value, field: &str) -> anyhow::Result<&'a str> {
    body.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("response has no string field '{field}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, serve};
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use std::collections::BTreeMap;

    async fn upstream(deployed: &'static str) -> String {
        serve(
            Router::new()
                .route(
                    "/__version__",
                    get(move || async move { axum::Json(json!({"version": deployed})) }),
                )
                .route(
                    "/repos/acme/widget/releases/latest",
                    get(|headers: HeaderMap| async move {
                        match headers.get("authorization") {
                            Some(v) if v == "token gh-t0ken" => {
                                Ok(axum::Json(json!({"tag_name": "1.2.0"})))
                            }
                            _ => Err(StatusCode::UNAUTHORIZED),
                        }
                    }),
                ),
        )
        .await
    }

    fn params(base: &str) -> Params {
        let supplied: BTreeMap<String, Value> = serde_json::from_value(json!({
            "server": base,
            "repo": "acme/widget",
            "github_api": base,
        }))
        .unwrap();
        DeployedVersion
            .parameters()
            .resolve("checks.core.deployed_version", &supplied)
            .unwrap()
    }

    #[tokio::test]
    async fn prerelease_of_latest_tag_passes() {
        let base = upstream("1.2.0-rc1").await;
        let outcome = DeployedVersion
            .run(&context(Some("gh-t0ken")), &params(&base))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.data,
            json!({"latest_tag": "1.2.0", "deployed_version": "1.2.0-rc1"})
        );
    }

    #[tokio::test]
    async fn longer_version_with_same_prefix_fails() {
        let base = upstream("1.2.01").await;
        let outcome = DeployedVersion
            .run(&context(Some("gh-t0ken")), &params(&base))
            .await
            .unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn rejected_release_request_is_an_error() {
        let base = upstream("1.2.0").await;
        let err = DeployedVersion
            .run(&context(None), &params(&base))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("acme/widget"));
    }

    #[test]
    fn server_is_url_overridable() {
        let check = lookout_engine::Check::new(
            "core",
            "version",
            &lookout_core::CheckDefinition {
                description: String::new(),
                module: "checks.core.deployed_version".into(),
                tags: vec![],
                ttl: None,
                params: serde_json::from_value(json!({"server": "http://a", "repo": "acme/widget"}))
                    .unwrap(),
                plot: None,
            },
            std::sync::Arc::new(DeployedVersion),
            std::time::Duration::from_secs(60),
        )
        .unwrap();
        let query = BTreeMap::from([
            ("server".to_string(), "http://b".to_string()),
            ("repo".to_string(), "evil/repo".to_string()),
        ]);
        let overridden = check.override_params(&query).unwrap();
        assert_eq!(overridden.params().str("server").unwrap(), "http://b");
        assert_eq!(overridden.params().str("repo").unwrap(), "acme/widget");
    }
}
