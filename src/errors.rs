use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::clients::store::StoreError;

/// Error taxonomy for the HTTP surface.
///
/// Synchronous-path errors are translated to a status code plus a structured
/// `{"message": ...}` body. Background enrichment failures never reach this
/// type; they are logged and dropped inside the pipeline.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bucket or object absent — 404.
    #[error("{0}")]
    NotFound(String),

    /// Bucket already exists — 409.
    #[error("{0}")]
    Conflict(String),

    /// Bad file type, empty query, malformed request — 400.
    #[error("{0}")]
    InvalidInput(String),

    /// The vector index rejected a search; its status code and body are
    /// surfaced verbatim to the caller.
    #[error("{message}")]
    IndexUnavailable {
        status: u16,
        message: String,
        details: String,
    },

    /// An outbound dependency failed in a way that has no status to relay.
    #[error("{0}")]
    Dependency(String),

    /// Anything else. The message is returned, stack traces are not.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "message": message }))).into_response()
            }
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(json!({ "message": message }))).into_response()
            }
            ApiError::InvalidInput(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "message": message }))).into_response()
            }
            ApiError::IndexUnavailable {
                status,
                message,
                details,
            } => {
                let status =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (
                    status,
                    Json(json!({ "message": message, "details": details })),
                )
                    .into_response()
            }
            ApiError::Dependency(message) => {
                (StatusCode::BAD_GATEWAY, Json(json!({ "message": message }))).into_response()
            }
            ApiError::Unexpected(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "message": "An unexpected error occurred.",
                    "details": err.to_string()
                })),
            )
                .into_response(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BucketNotFound(name) => {
                ApiError::NotFound(format!("Bucket '{}' does not exist.", name))
            }
            StoreError::BucketAlreadyExists(name) => {
                ApiError::Conflict(format!("Bucket '{}' already exists.", name))
            }
            StoreError::BucketNotEmpty(name) => ApiError::InvalidInput(format!(
                "Bucket '{}' is not empty. Retry with '?force=true' to delete all objects and the bucket.",
                name
            )),
            StoreError::ObjectNotFound { bucket, key } => {
                ApiError::NotFound(format!("Object '{}' not found in bucket '{}'.", key, bucket))
            }
            StoreError::InvalidBucketName { name, reason } => {
                ApiError::InvalidInput(format!("Bucket name '{}' is invalid: {}.", name, reason))
            }
            StoreError::InvalidObjectKey => {
                ApiError::InvalidInput("Object key is invalid.".to_string())
            }
            other => ApiError::Unexpected(other.into()),
        }
    }
}
