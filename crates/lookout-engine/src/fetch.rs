//! HTTP fetch helpers used by check modules.
//!
//! Every helper composes, from the outside in: a request permit from the
//! process-wide [`ConcurrencyLimiter`], redaction of `Authorization` on the
//! error that escapes, and the [`RetryPolicy`] around each attempt. The
//! redaction sits outside the retries so every retried attempt still sends
//! the real credential.

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{FetchError, FetchResult, RequestInfo};
use crate::limiter::ConcurrencyLimiter;
use crate::retry::RetryPolicy;

const USER_AGENT: &str = "lookout";

/// A fully read response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    /// Time until the response headers arrived.
    pub elapsed: Duration,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Shared outbound HTTP client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    limiter: ConcurrencyLimiter,
    retry: RetryPolicy,
    default_headers: BTreeMap<String, String>,
}

impl Fetcher {
    pub fn new(
        timeout: Duration,
        default_headers: BTreeMap<String, String>,
        limiter: ConcurrencyLimiter,
        retry: RetryPolicy,
    ) -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Invalid(e.to_string()))?;
        Ok(Self {
            client,
            limiter,
            retry,
            default_headers,
        })
    }

    /// GET and decode a JSON body. Non-2xx statuses are errors.
    pub async fn json(&self, url: &str, headers: &[(&str, &str)]) -> FetchResult<Value> {
        let response = self.execute(Method::GET, url, headers, true).await?;
        serde_json::from_slice(&response.body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// GET a body as text, whatever the status.
    pub async fn text(&self, url: &str, headers: &[(&str, &str)]) -> FetchResult<String> {
        let response = self.execute(Method::GET, url, headers, false).await?;
        Ok(response.text())
    }

    /// HEAD request; returns the status and headers.
    pub async fn head(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> FetchResult<(u16, BTreeMap<String, String>)> {
        let response = self.execute(Method::HEAD, url, headers, false).await?;
        Ok((response.status, response.headers))
    }

    /// GET returning status, headers, body and timing, whatever the status.
    pub async fn raw(&self, url: &str, headers: &[(&str, &str)]) -> FetchResult<RawResponse> {
        self.execute(Method::GET, url, headers, false).await
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: &[(&str, &str)],
        require_success: bool,
    ) -> FetchResult<RawResponse> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| FetchError::Cancelled)?;

        let mut merged = self.default_headers.clone();
        for (name, value) in headers {
            merged.insert((*name).to_string(), (*value).to_string());
        }
        let request = RequestInfo::new(method.as_str(), url, merged.into_iter().collect());

        debug!(method = %request.method, url, "fetch");
        self.retry
            .run(|| self.attempt(&method, &request, require_success))
            .await
            .map_err(FetchError::redact_authorization)
    }

    async fn attempt(
        &self,
        method: &Method,
        request: &RequestInfo,
        require_success: bool,
    ) -> FetchResult<RawResponse> {
        let started = Instant::now();
        let mut builder = self.client.request(method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(e, request))?;
        let elapsed = started.elapsed();
        let status = response.status().as_u16();
        if require_success && !response.status().is_success() {
            return Err(FetchError::Status {
                request: request.clone(),
                status,
            });
        }

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await.map_err(|e| classify(e, request))?;

        Ok(RawResponse {
            status,
            headers,
            body,
            elapsed,
        })
    }
}

fn classify(err: reqwest::Error, request: &RequestInfo) -> FetchError {
    let request = request.clone();
    if err.is_timeout() {
        FetchError::Timeout { request }
    } else if err.is_builder() {
        FetchError::Invalid(err.to_string())
    } else if err.is_body() || err.is_decode() {
        FetchError::Body {
            request,
            reason: err.to_string(),
        }
    } else {
        FetchError::Connect {
            request,
            reason: err.to_string(),
        }
    }
}
