//! Defines routes for the storage facade.
//!
//! ## Structure
//! - **Bucket-level endpoints**
//!   - `POST   /bucket/{name}` — create bucket
//!   - `DELETE /bucket/{name}?force=bool` — delete bucket (drain with force)
//!   - `GET    /buckets` — list buckets
//!
//! - **Object-level endpoints**
//!   - `POST   /bucket/{name}/upload` — multipart image upload
//!   - `GET    /bucket/{name}/objects` — recursive listing with metadata
//!   - `GET    /bucket/{name}/object/{etag}` — download by fingerprint
//!   - `DELETE /bucket/{name}/object/{etag}` — delete by fingerprint
//!
//! - **Search**
//!   - `GET /search?query=&limit=` — semantic search over captions
//!
//! - **Presigned retrieval** (consumed by the caption service)
//!   - `GET /presigned/{bucket}/{*key}?expires=&signature=`

use crate::{
    handlers::{
        bucket_handlers::{create_bucket, delete_bucket, list_buckets},
        health_handlers::{healthz, readyz},
        object_handlers::{
            delete_object_by_etag, get_object_by_etag, get_presigned_object, list_objects,
            upload_object,
        },
        search_handlers::search,
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router for the full HTTP surface.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bucket-level routes
        .route("/buckets", get(list_buckets))
        .route("/bucket/{name}", post(create_bucket).delete(delete_bucket))
        // Object-level routes
        .route("/bucket/{name}/upload", post(upload_object))
        .route("/bucket/{name}/objects", get(list_objects))
        .route(
            "/bucket/{name}/object/{etag}",
            get(get_object_by_etag).delete(delete_object_by_etag),
        )
        // Search
        .route("/search", get(search))
        // Presigned retrieval
        .route("/presigned/{bucket}/{*key}", get(get_presigned_object))
}
