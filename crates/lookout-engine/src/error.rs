//! Error types for fetches and check runs.

use std::time::Duration;

use thiserror::Error;

use crate::parallel::Cancelled;
use crate::retry::{RetryClass, Retryable};

/// Placeholder written over credentials in captured request metadata.
pub const REDACTED: &str = "[secure]";

/// Result type alias for outbound fetches.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type alias for check runs.
pub type RunResult<T> = Result<T, RunError>;

/// Metadata of an outbound request, kept on errors for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl RequestInfo {
    pub fn new(method: &str, url: &str, headers: Vec<(String, String)>) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            headers,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace every `Authorization` header value with [`REDACTED`].
    pub fn redact_authorization(&mut self) {
        for (name, value) in &mut self.headers {
            if name.eq_ignore_ascii_case("authorization") {
                *value = REDACTED.to_string();
            }
        }
    }
}

/// Failure of an outbound HTTP request.
///
/// The display form names the method and URL only; headers are reachable
/// through [`FetchError::request`] and the debug form.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{} {} timed out", .request.method, .request.url)]
    Timeout { request: RequestInfo },

    #[error("{} {} failed to connect: {reason}", .request.method, .request.url)]
    Connect { request: RequestInfo, reason: String },

    #[error("{} {} returned HTTP {status}", .request.method, .request.url)]
    Status { request: RequestInfo, status: u16 },

    #[error("{} {} failed reading body: {reason}", .request.method, .request.url)]
    Body { request: RequestInfo, reason: String },

    #[error("invalid response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn request(&self) -> Option<&RequestInfo> {
        match self {
            FetchError::Timeout { request }
            | FetchError::Connect { request, .. }
            | FetchError::Status { request, .. }
            | FetchError::Body { request, .. } => Some(request),
            FetchError::Decode { .. } | FetchError::Invalid(_) | FetchError::Cancelled => None,
        }
    }

    /// Redact the `Authorization` header of the captured request, if any.
    pub fn redact_authorization(mut self) -> Self {
        match &mut self {
            FetchError::Timeout { request }
            | FetchError::Connect { request, .. }
            | FetchError::Status { request, .. }
            | FetchError::Body { request, .. } => request.redact_authorization(),
            FetchError::Decode { .. } | FetchError::Invalid(_) | FetchError::Cancelled => {}
        }
        self
    }

    /// Timeouts and connection-level failures.
    pub fn is_transient(&self) -> bool {
        self.retry_class() == RetryClass::Transient
    }
}

impl Retryable for FetchError {
    fn retry_class(&self) -> RetryClass {
        match self {
            FetchError::Timeout { .. } | FetchError::Connect { .. } | FetchError::Body { .. } => {
                RetryClass::Transient
            }
            FetchError::Status { .. } => RetryClass::Status,
            FetchError::Decode { .. } | FetchError::Invalid(_) | FetchError::Cancelled => {
                RetryClass::Permanent
            }
        }
    }
}

/// Failure of a check run that could not be turned into a result.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("timed out after {waited:?} waiting for the lock of {check}")]
    LockTimeout { check: String, waited: Duration },

    #[error("check {check} raised: {source:#}")]
    Check {
        check: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}
