//! Bucket lifecycle handlers.

use crate::{errors::ApiError, models::bucket::BucketSummary, state::AppState};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct DeleteBucketQuery {
    pub force: Option<bool>,
}

/// POST `/bucket/{name}` — create a bucket.
pub async fn create_bucket(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.manager.create_bucket(&name).await?;
    Ok(Json(json!({
        "message": format!("Bucket '{}' created successfully.", name)
    })))
}

/// DELETE `/bucket/{name}?force=bool` — delete a bucket, draining it first
/// when `force` is set.
pub async fn delete_bucket(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<DeleteBucketQuery>,
) -> Result<Json<Value>, ApiError> {
    let force = query.force.unwrap_or(false);
    state.manager.delete_bucket(&name, force).await?;

    let message = if force {
        format!("Bucket '{}' and all contents deleted successfully.", name)
    } else {
        format!("Bucket '{}' deleted successfully.", name)
    };
    Ok(Json(json!({ "message": message })))
}

/// GET `/buckets` — list all buckets.
pub async fn list_buckets(
    State(state): State<AppState>,
) -> Result<Json<Vec<BucketSummary>>, ApiError> {
    Ok(Json(state.manager.list_buckets().await?))
}
