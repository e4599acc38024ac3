//! Admin API errors with structured responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::error::RuntimeError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        match &self {
            ApiError::Internal(msg) => {
                error!(error_code = code, message = %msg, "API error");
            }
            _ => {
                tracing::debug!(error_code = code, message = %message, "Client error");
            }
        }

        (status, Json(ErrorResponse { error: message, code })).into_response()
    }
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        let msg = err.to_string();
        match err {
            RuntimeError::ApplicationNotFound(_)
            | RuntimeError::ApplicationNotRunning(_)
            | RuntimeError::ApplicationLogNotFound(_)
            | RuntimeError::PageNotFound(_) => Self::NotFound(msg),
            RuntimeError::InvalidArgument(_) | RuntimeError::UnknownMethod(_) => {
                Self::BadRequest(msg)
            }
            RuntimeError::ApplicationNotEnabled(_) | RuntimeError::ApplicationAlreadyRunning(_) => {
                Self::Conflict(msg)
            }
            RuntimeError::MethodFailed(_) | RuntimeError::Internal(_) => Self::Internal(msg),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use apprunner_protocol::PageRef;

    #[test]
    fn test_runtime_errors_map_to_statuses() {
        let cases = [
            (
                RuntimeError::PageNotFound(PageRef::new("a", "p")),
                StatusCode::NOT_FOUND,
            ),
            (
                RuntimeError::ApplicationAlreadyRunning("a".into()),
                StatusCode::CONFLICT,
            ),
            (
                RuntimeError::ApplicationNotEnabled("a".into()),
                StatusCode::CONFLICT,
            ),
            (
                RuntimeError::invalid_argument("bad"),
                StatusCode::BAD_REQUEST,
            ),
            (
                RuntimeError::internal("boom"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }
}
