//! HTTP error handling and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::CoreError;

/// API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

/// Application error type for HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Resource not found
    NotFound(String),
    /// Invalid request (validation error)
    BadRequest(String),
    /// Valid input that could not be computed
    Unprocessable(String),
    /// A required collaborator is unavailable
    Degraded(String),
    /// Internal server error
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", msg)),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", msg))
            }
            AppError::Unprocessable(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiError::new("COMPUTATION_FAILURE", msg),
            ),
            AppError::Degraded(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError::new("DEPENDENCY_DEGRADED", msg),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::new("INTERNAL_ERROR", msg),
            ),
        };

        (status, Json(error)).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound(msg) => AppError::NotFound(msg),
            CoreError::InvalidArgument(msg) => AppError::BadRequest(msg),
            CoreError::ComputationFailure(msg) => AppError::Unprocessable(msg),
            CoreError::ExternalDependencyDegraded(msg) => AppError::Degraded(msg),
            CoreError::Cancelled(msg) => AppError::Degraded(msg),
            CoreError::Repository(e) => {
                if e.is_retryable() {
                    AppError::Degraded(e.to_string())
                } else {
                    AppError::Internal(e.to_string())
                }
            }
        }
    }
}

impl From<crate::db::RepositoryError> for AppError {
    fn from(err: crate::db::RepositoryError) -> Self {
        AppError::from(CoreError::Repository(err))
    }
}
