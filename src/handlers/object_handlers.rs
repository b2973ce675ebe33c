//! Object handlers: multipart upload, listing, fingerprint-addressed
//! download/delete, and presigned retrieval for the caption service.
//!
//! Downloads stream the payload out instead of buffering it.

use crate::{
    errors::ApiError,
    models::object::{ObjectSummary, UploadReceipt},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::clients::store::{GetResult, ObjectStore, clean_etag};

/// POST `/bucket/{name}/upload` — multipart upload of one image.
///
/// Expects a `file` part (with filename and content type) and an optional
/// `description` part. Returns the fingerprint the object is addressed by.
pub async fn upload_object(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, ApiError> {
    let mut file: Option<(String, Option<String>, Bytes)> = None;
    let mut description = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::InvalidInput(format!("Malformed multipart body: {}.", err)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::InvalidInput("File part has no filename.".into()))?;
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(|err| {
                    ApiError::InvalidInput(format!("Failed to read file part: {}.", err))
                })?;
                file = Some((filename, content_type, data));
            }
            Some("description") => {
                description = field.text().await.map_err(|err| {
                    ApiError::InvalidInput(format!("Failed to read description part: {}.", err))
                })?;
            }
            _ => {}
        }
    }

    let (filename, content_type, data) = file
        .ok_or_else(|| ApiError::InvalidInput("Multipart field `file` is required.".into()))?;

    let receipt = state
        .manager
        .upload_object(
            &bucket,
            &filename,
            content_type.as_deref(),
            &description,
            data,
        )
        .await?;
    Ok(Json(receipt))
}

/// GET `/bucket/{name}/objects` — recursive listing with metadata.
pub async fn list_objects(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Json<Vec<ObjectSummary>>, ApiError> {
    Ok(Json(state.manager.list_objects(&bucket).await?))
}

/// GET `/bucket/{name}/object/{etag}` — download by fingerprint.
pub async fn get_object_by_etag(
    State(state): State<AppState>,
    Path((bucket, etag)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let result = state.manager.get_object_by_etag(&bucket, &etag).await?;
    Ok(object_response(result))
}

/// DELETE `/bucket/{name}/object/{etag}` — delete by fingerprint.
pub async fn delete_object_by_etag(
    State(state): State<AppState>,
    Path((bucket, etag)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let key = state.manager.delete_object_by_etag(&bucket, &etag).await?;
    Ok(Json(json!({
        "message": format!("Object '{}' deleted successfully from bucket '{}'.", key, bucket),
        "etag": clean_etag(&etag)
    })))
}

#[derive(Debug, Deserialize)]
pub struct PresignedQuery {
    pub expires: i64,
    pub signature: String,
}

/// GET `/presigned/{bucket}/{*key}` — retrieval endpoint behind the
/// time-limited URLs the store issues for the caption service.
pub async fn get_presigned_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(query): Query<PresignedQuery>,
) -> Result<Response, ApiError> {
    let valid = state
        .store
        .verify_presigned(&bucket, &key, query.expires, &query.signature)
        .await?;
    if !valid {
        return Err(ApiError::InvalidInput(
            "Presigned URL is expired or invalid.".into(),
        ));
    }

    let result = state.store.get_object(&bucket, &key).await?;
    Ok(object_response(result))
}

/// Stream an object out as `application/octet-stream` with its key offered
/// as the download filename.
fn object_response(result: GetResult) -> Response {
    let GetResult { stat, body } = result;

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&stat.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", stat.key))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    response
}
