//! Custom error types and handling
//!
//! This module defines the application's error types and implements
//! conversion to HTTP responses for the Axum framework. Sandbox-visible
//! failures (timeout, missing result, non-UTF-8 result) are *not* modeled
//! here: they are negative `status` values inside a normal 200 response,
//! per the executor's contract (see `executor`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed request: bad JSON, missing `commands`, wrong field types, empty list.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Referenced environment or file id not present in the store.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Pool acquire timed out; the caller should retry later.
    #[error("Service unavailable: no sandbox available")]
    ServiceUnavailable,

    /// Any uncaught failure during staging, execution, harvest or snapshot
    /// outside the executor's classified sandbox error codes.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Error response body. `status` mirrors the executor's own `UNKNOWN` code
/// so a client that always reads `status` off a sandbox response doesn't
/// need a separate code path for transport-level failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: i32,
    pub error: ErrorDetails,
}

/// Error details in response.
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandboxerr: Option<String>,
}

impl AppError {
    /// Get the error code for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) | Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let (message, sandboxerr) = match &self {
            AppError::Internal(e) => {
                tracing::error!("unhandled error: {:?}", e);
                ("An internal error occurred".to_string(), Some(format!("{e:?}")))
            }
            _ => (self.to_string(), None),
        };

        let body = ErrorResponse {
            status: crate::constants::error_codes::UNKNOWN,
            error: ErrorDetails {
                code: self.error_code().to_string(),
                message,
                sandboxerr,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<bollard::errors::Error> for AppError {
    fn from(err: bollard::errors::Error) -> Self {
        AppError::Internal(anyhow::anyhow!(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(anyhow::anyhow!(err))
    }
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_400() {
        let err = AppError::BadRequest("missing field".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "BAD_REQUEST");
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError::NotFound("unknown environment 'x'".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[test]
    fn service_unavailable_maps_to_503() {
        let err = AppError::ServiceUnavailable;
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_code(), "SERVICE_UNAVAILABLE");
    }

    #[test]
    fn internal_maps_to_500() {
        let err = AppError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn io_error_converts_to_internal() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: AppError = io_err.into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn error_body_always_carries_unknown_status() {
        let response = AppError::BadRequest("bad".to_string()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], -1);
    }
}
