//! Typed contract for the blob store backing the facade.
//!
//! The facade treats the store as an interchangeable collaborator: bucket
//! lifecycle, object payloads, recursive listings with metadata, and
//! time-limited retrieval URLs. Everything above this trait deals in the
//! store's conventions (quoted ETags in listings) without knowing which
//! backend produced them.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::{io, pin::Pin, time::Duration};
use thiserror::Error;

/// Streamed object payload.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{0}` is not empty")]
    BucketNotEmpty(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Bucket metadata as reported by the store.
#[derive(Clone, Debug)]
pub struct BucketInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Object metadata as reported by listings and stat calls.
///
/// `etag` keeps the store's convention of surrounding quotes; callers that
/// compare fingerprints strip them with [`clean_etag`].
#[derive(Clone, Debug)]
pub struct ObjectStat {
    pub key: String,
    pub size_bytes: i64,
    pub etag: String,
    pub content_type: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// Optional attributes attached to an object at upload time.
#[derive(Clone, Debug, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub description: Option<String>,
    pub original_name: Option<String>,
}

/// An opened object: its metadata plus a stream of payload bytes.
pub struct GetResult {
    pub stat: ObjectStat,
    pub body: ByteStream,
}

impl std::fmt::Debug for GetResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GetResult")
            .field("stat", &self.stat)
            .field("body", &"<ByteStream>")
            .finish()
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool>;

    /// Create a bucket. Fails with `BucketAlreadyExists` on name conflict.
    async fn make_bucket(&self, bucket: &str) -> StoreResult<BucketInfo>;

    /// Delete an empty bucket. Fails with `BucketNotEmpty` if objects remain.
    async fn remove_bucket(&self, bucket: &str) -> StoreResult<()>;

    async fn list_buckets(&self) -> StoreResult<Vec<BucketInfo>>;

    /// Store an object, overwriting any previous object under the same key.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        opts: PutOptions,
        body: ByteStream,
    ) -> StoreResult<ObjectStat>;

    /// Open an object for reading.
    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<GetResult>;

    async fn remove_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Bulk-delete objects. Keys that are already gone are skipped.
    async fn remove_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<()>;

    /// Exhaustive recursive listing of a bucket with metadata. There is no
    /// pagination; fingerprint lookup is a linear scan over this result.
    async fn list_objects(&self, bucket: &str) -> StoreResult<Vec<ObjectStat>>;

    /// Issue a time-limited retrieval URL for an object.
    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Duration,
    ) -> StoreResult<String>;

    /// Check a presigned request's expiry timestamp and signature.
    async fn verify_presigned(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> StoreResult<bool>;
}

/// Strip the store's surrounding quote characters from a fingerprint.
pub fn clean_etag(etag: &str) -> &str {
    etag.trim_matches('"')
}

/// Fingerprint equality: quote-stripped and case-insensitive.
pub fn etags_match(a: &str, b: &str) -> bool {
    clean_etag(a).eq_ignore_ascii_case(clean_etag(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_etag_strips_surrounding_quotes() {
        assert_eq!(clean_etag("\"abc123\""), "abc123");
        assert_eq!(clean_etag("abc123"), "abc123");
        assert_eq!(clean_etag("\"\""), "");
    }

    #[test]
    fn etags_match_ignores_quotes_and_case() {
        assert!(etags_match("\"ABC123\"", "abc123"));
        assert!(etags_match("abc123", "ABC123"));
        assert!(etags_match("\"d41d8cd9\"", "\"D41D8CD9\""));
        assert!(!etags_match("abc123", "abc124"));
    }
}
