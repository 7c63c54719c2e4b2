//! Error types for the signet service surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use signet_lifecycle::LifecycleError;
use signet_storage::StorageError;
use thiserror::Error;

/// Handler-level errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request body or multipart payload.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Lifecycle outcome, classified by the controller.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Lifecycle(err) => match err {
                LifecycleError::Validation(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
                }
                LifecycleError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                LifecycleError::InvalidTransition(_) => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION")
                }
                LifecycleError::Storage(StorageError::NotFound(_)) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND")
                }
                LifecycleError::Storage(StorageError::Conflict(_)) => {
                    (StatusCode::CONFLICT, "CONFLICT")
                }
                LifecycleError::Render(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "RENDER_ERROR")
                }
                LifecycleError::Storage(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
                }
            },
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers.
pub type ApiResult<T> = Result<T, ApiError>;
