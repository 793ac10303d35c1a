//! API error type and its HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lookout_core::ConfigError;
use lookout_engine::{Cancelled, LookupError, RunError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::middleware::CheckLabels;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    NotFound(#[from] LookupError),

    #[error("{0}")]
    BadRequest(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(#[from] ConfigError),

    #[error("unsupported output format")]
    NotAcceptable,

    #[error("{source}")]
    Run {
        project: String,
        name: String,
        #[source]
        source: RunError,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Self::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            Self::Run { .. } | Self::Cancelled(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Run {
                project,
                name,
                source,
            } => {
                error!(project = %project, check = %name, error = %source, "check run failed");
                json!({"success": false, "data": source.to_string(), "project": project, "name": name})
            }
            Self::Cancelled(_) | Self::Internal(_) => {
                error!(error = %self, "request failed");
                json!({"success": false, "data": self.to_string()})
            }
            _ => json!({"success": false, "error": self.to_string()}),
        };
        let response = (status, Json(body)).into_response();
        match &self {
            Self::Run { project, name, .. } => CheckLabels::new(project, name).attach(response),
            _ => response,
        }
    }
}
