//! Helpers shared by module tests.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::Router;
use lookout_engine::{CheckContext, ConcurrencyLimiter, Fetcher, RetryPolicy};

pub(crate) fn context(github_token: Option<&str>) -> CheckContext {
    let fetcher = Fetcher::new(
        Duration::from_secs(2),
        BTreeMap::new(),
        ConcurrencyLimiter::new(4),
        RetryPolicy::new(0),
    )
    .unwrap();
    CheckContext {
        fetcher,
        workers: ConcurrencyLimiter::new(2),
        github_token: github_token.map(str::to_string),
    }
}

/// Serve `router` on an ephemeral port; returns its base URL.
pub(crate) async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

/// A URL nothing listens on.
pub(crate) fn closed_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
