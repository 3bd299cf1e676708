//! Error types for rame-server
//!
//! Library errors are mapped onto HTTP status codes here: unknown lists are
//! 404, rejected operations and malformed bodies are 400, anything else 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Operation not allowed on the target (400)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// rame-common error that has no dedicated status
    #[error("Common error: {0}")]
    Common(rame_common::Error),
}

impl From<rame_common::Error> for ApiError {
    fn from(err: rame_common::Error) -> Self {
        match err {
            rame_common::Error::NotFound(msg) => ApiError::NotFound(msg),
            rame_common::Error::InvalidOperation(msg) => ApiError::InvalidOperation(msg),
            rame_common::Error::Internal(msg) => ApiError::Internal(msg),
            rame_common::Error::Database(e) => ApiError::Database(e),
            other => ApiError::Common(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::InvalidOperation(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_OPERATION", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Database(ref err) => {
                tracing::error!(error = %err, "Database error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    err.to_string(),
                )
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
