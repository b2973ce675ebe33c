//! Bucket lifecycle and object CRUD on top of the object-store client.
//!
//! Objects are addressed externally by their content fingerprint (ETag), a
//! store-assigned hash the store reports wrapped in quotes. The store keeps
//! no secondary index for it, so every fingerprint lookup is a full
//! recursive listing and a linear scan. First match wins when a bucket
//! contains duplicate fingerprints.

use crate::{
    clients::store::{
        ByteStream, GetResult, ObjectStore, PutOptions, clean_etag, etags_match,
    },
    errors::ApiError,
    models::{
        bucket::BucketSummary,
        object::{ObjectSummary, UploadReceipt},
    },
    services::enrichment::{EnrichmentJob, EnrichmentPipeline},
};
use bytes::Bytes;
use std::{sync::Arc, time::Duration};
use tracing::warn;

/// Only images are accepted; both checks must pass since the declared
/// content type alone is not trusted.
const ALLOWED_CONTENT_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
];
const ALLOWED_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"];

/// Deletion visibility may lag the bulk delete during a force bucket delete;
/// the listing is polled with bounded retries before the bucket itself goes.
const DRAIN_POLL_ATTEMPTS: usize = 10;
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct StorageManager {
    store: Arc<dyn ObjectStore>,
    pipeline: EnrichmentPipeline,
}

impl StorageManager {
    pub fn new(store: Arc<dyn ObjectStore>, pipeline: EnrichmentPipeline) -> Self {
        Self { store, pipeline }
    }

    pub async fn create_bucket(&self, name: &str) -> Result<(), ApiError> {
        if self.store.bucket_exists(name).await? {
            return Err(ApiError::Conflict(format!(
                "Bucket '{}' already exists.",
                name
            )));
        }
        self.store.make_bucket(name).await?;
        Ok(())
    }

    /// Delete a bucket. Without `force` a non-empty bucket is refused; with
    /// `force` all objects are drained first, then the bucket is removed.
    pub async fn delete_bucket(&self, name: &str, force: bool) -> Result<(), ApiError> {
        if !self.store.bucket_exists(name).await? {
            return Err(ApiError::NotFound(format!(
                "Bucket '{}' does not exist.",
                name
            )));
        }

        if force {
            let objects = self.store.list_objects(name).await?;
            if !objects.is_empty() {
                let keys: Vec<String> = objects.into_iter().map(|obj| obj.key).collect();
                self.store.remove_objects(name, &keys).await?;
                self.wait_until_drained(name).await?;
            }
        }

        self.store.remove_bucket(name).await?;
        Ok(())
    }

    async fn wait_until_drained(&self, name: &str) -> Result<(), ApiError> {
        for _ in 0..DRAIN_POLL_ATTEMPTS {
            if self.store.list_objects(name).await?.is_empty() {
                return Ok(());
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
        warn!(
            bucket = name,
            "bucket still lists objects after drain; attempting removal anyway"
        );
        Ok(())
    }

    pub async fn list_buckets(&self) -> Result<Vec<BucketSummary>, ApiError> {
        let buckets = self.store.list_buckets().await?;
        Ok(buckets
            .into_iter()
            .map(|bucket| BucketSummary {
                name: bucket.name,
                created: bucket.created_at,
            })
            .collect())
    }

    pub async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>, ApiError> {
        if !self.store.bucket_exists(bucket).await? {
            return Err(ApiError::NotFound(format!(
                "Bucket '{}' does not exist.",
                bucket
            )));
        }
        let objects = self.store.list_objects(bucket).await?;
        Ok(objects
            .into_iter()
            .map(|obj| ObjectSummary {
                etag: clean_etag(&obj.etag).to_string(),
                key: obj.key,
                size: obj.size_bytes,
                last_modified: obj.last_modified,
            })
            .collect())
    }

    /// Store an uploaded image and schedule caption enrichment for it.
    ///
    /// The enrichment run is decoupled from this call: its outcome never
    /// changes the response the uploader sees.
    pub async fn upload_object(
        &self,
        bucket: &str,
        filename: &str,
        content_type: Option<&str>,
        description: &str,
        data: Bytes,
    ) -> Result<UploadReceipt, ApiError> {
        if !self.store.bucket_exists(bucket).await? {
            return Err(ApiError::NotFound(format!(
                "Bucket '{}' does not exist.",
                bucket
            )));
        }

        let content_type = content_type.unwrap_or_default();
        if !is_allowed_upload(filename, content_type) {
            return Err(ApiError::InvalidInput(
                "Only image files (JPG, PNG, GIF, WEBP, BMP) are allowed.".to_string(),
            ));
        }

        let opts = PutOptions {
            content_type: Some(content_type.to_string()),
            description: Some(description.to_string()),
            original_name: Some(filename.to_string()),
        };
        let body: ByteStream = Box::pin(futures::stream::once(async move { Ok(data) }));
        let stat = self.store.put_object(bucket, filename, opts, body).await?;

        let id = clean_etag(&stat.etag).to_string();
        self.pipeline.schedule(EnrichmentJob {
            bucket: bucket.to_string(),
            key: stat.key.clone(),
            etag: id.clone(),
        });

        Ok(UploadReceipt {
            id,
            object_name: stat.key,
            description: description.to_string(),
        })
    }

    /// Open an object addressed by fingerprint for streaming download.
    pub async fn get_object_by_etag(
        &self,
        bucket: &str,
        etag: &str,
    ) -> Result<GetResult, ApiError> {
        let key = self.find_key_by_etag(bucket, etag).await?;
        Ok(self.store.get_object(bucket, &key).await?)
    }

    /// Delete an object addressed by fingerprint. Returns the deleted key.
    pub async fn delete_object_by_etag(
        &self,
        bucket: &str,
        etag: &str,
    ) -> Result<String, ApiError> {
        let key = self.find_key_by_etag(bucket, etag).await?;
        self.store.remove_object(bucket, &key).await?;
        Ok(key)
    }

    /// O(n) fingerprint lookup over the full recursive listing.
    async fn find_key_by_etag(&self, bucket: &str, etag: &str) -> Result<String, ApiError> {
        if !self.store.bucket_exists(bucket).await? {
            return Err(ApiError::NotFound(format!(
                "Bucket '{}' does not exist.",
                bucket
            )));
        }
        let objects = self.store.list_objects(bucket).await?;
        objects
            .into_iter()
            .find(|obj| etags_match(&obj.etag, etag))
            .map(|obj| obj.key)
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "Object with ETag '{}' not found in bucket '{}'.",
                    clean_etag(etag),
                    bucket
                ))
            })
    }
}

fn is_allowed_upload(filename: &str, content_type: &str) -> bool {
    let content_ok = ALLOWED_CONTENT_TYPES
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(content_type));

    let extension = filename
        .rfind('.')
        .map(|idx| filename[idx..].to_ascii_lowercase())
        .unwrap_or_default();
    let extension_ok = ALLOWED_EXTENSIONS.contains(&extension.as_str());

    content_ok && extension_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        ClientError,
        caption::CaptionService,
        fs_store::{FsObjectStore, init_schema},
        vector_index::{CaptionIndex, IndexHit},
    };
    use async_trait::async_trait;
    use futures::StreamExt;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    struct NullCaptioner;

    #[async_trait]
    impl CaptionService for NullCaptioner {
        async fn caption(&self, _image_url: &str) -> Result<String, ClientError> {
            Ok("a caption".into())
        }
    }

    struct NullIndex;

    #[async_trait]
    impl CaptionIndex for NullIndex {
        async fn add_caption(
            &self,
            _etag: &str,
            _caption: &str,
            _bucket: &str,
        ) -> Result<(), ClientError> {
            Ok(())
        }

        async fn search_captions(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<IndexHit>, ClientError> {
            Ok(Vec::new())
        }
    }

    async fn test_manager() -> (StorageManager, TempDir) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(
            Arc::new(pool),
            dir.path(),
            "http://localhost:3000",
            "test-secret",
        ));
        let pipeline = EnrichmentPipeline::new(
            store.clone(),
            Arc::new(NullCaptioner),
            Arc::new(NullIndex),
            2,
            Duration::from_secs(5),
        );
        (StorageManager::new(store, pipeline), dir)
    }

    async fn read_all(result: GetResult) -> Vec<u8> {
        let mut body = result.body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn creating_a_bucket_twice_conflicts() {
        let (manager, _dir) = test_manager().await;
        manager.create_bucket("pets").await.unwrap();
        let err = manager.create_bucket("pets").await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn upload_rejects_non_image_content_and_extensions() {
        let (manager, _dir) = test_manager().await;
        manager.create_bucket("pets").await.unwrap();

        // content type ok, extension bad
        let err = manager
            .upload_object("pets", "tool.exe", Some("image/jpeg"), "", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        // extension ok, content type bad
        let err = manager
            .upload_object("pets", "cat.jpg", Some("text/plain"), "", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        // content type missing entirely
        let err = manager
            .upload_object("pets", "cat.jpeg", None, "", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));

        // both ok
        manager
            .upload_object(
                "pets",
                "cat.jpeg",
                Some("image/jpeg"),
                "a cat",
                Bytes::from_static(b"fake jpeg"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn upload_to_missing_bucket_is_not_found() {
        let (manager, _dir) = test_manager().await;
        let err = manager
            .upload_object("ghost", "cat.png", Some("image/png"), "", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn upload_list_download_by_fingerprint() {
        let (manager, _dir) = test_manager().await;
        manager.create_bucket("pets").await.unwrap();

        let receipt = manager
            .upload_object(
                "pets",
                "cat.png",
                Some("image/png"),
                "a cat",
                Bytes::from_static(b"png bytes"),
            )
            .await
            .unwrap();
        assert!(!receipt.id.is_empty());
        assert_eq!(receipt.object_name, "cat.png");
        assert_eq!(receipt.description, "a cat");
        assert!(!receipt.id.contains('"'));

        let listing = manager.list_objects("pets").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].key, "cat.png");
        assert_eq!(listing[0].etag, receipt.id);

        let fetched = manager.get_object_by_etag("pets", &receipt.id).await.unwrap();
        assert_eq!(read_all(fetched).await, b"png bytes");
    }

    #[tokio::test]
    async fn fingerprint_lookup_ignores_quotes_and_case() {
        let (manager, _dir) = test_manager().await;
        manager.create_bucket("pets").await.unwrap();
        let receipt = manager
            .upload_object(
                "pets",
                "cat.png",
                Some("image/png"),
                "",
                Bytes::from_static(b"bytes"),
            )
            .await
            .unwrap();

        let quoted_upper = format!("\"{}\"", receipt.id.to_ascii_uppercase());
        manager
            .get_object_by_etag("pets", &quoted_upper)
            .await
            .unwrap();
        let key = manager
            .delete_object_by_etag("pets", &quoted_upper)
            .await
            .unwrap();
        assert_eq!(key, "cat.png");

        let err = manager
            .get_object_by_etag("pets", &receipt.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn listing_is_stable_between_writes() {
        let (manager, _dir) = test_manager().await;
        manager.create_bucket("pets").await.unwrap();
        for name in ["a.png", "b.png", "c.png"] {
            manager
                .upload_object("pets", name, Some("image/png"), "", Bytes::from_static(b"x"))
                .await
                .unwrap();
        }

        let first = manager.list_objects("pets").await.unwrap();
        let second = manager.list_objects("pets").await.unwrap();
        let project = |items: &[ObjectSummary]| {
            items
                .iter()
                .map(|o| (o.key.clone(), o.size, o.etag.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(project(&first), project(&second));
    }

    #[tokio::test]
    async fn delete_bucket_requires_force_when_occupied() {
        let (manager, _dir) = test_manager().await;
        manager.create_bucket("pets").await.unwrap();
        manager
            .upload_object(
                "pets",
                "cat.png",
                Some("image/png"),
                "",
                Bytes::from_static(b"x"),
            )
            .await
            .unwrap();

        let err = manager.delete_bucket("pets", false).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
        // the refusal must not have deleted anything
        assert_eq!(manager.list_objects("pets").await.unwrap().len(), 1);

        manager.delete_bucket("pets", true).await.unwrap();
        let names: Vec<String> = manager
            .list_buckets()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert!(!names.contains(&"pets".to_string()));
    }

    #[tokio::test]
    async fn delete_missing_bucket_is_not_found() {
        let (manager, _dir) = test_manager().await;
        let err = manager.delete_bucket("ghost", false).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        let err = manager.delete_bucket("ghost", true).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn allow_list_checks_both_signals() {
        assert!(is_allowed_upload("cat.jpeg", "image/jpeg"));
        assert!(is_allowed_upload("cat.JPG", "IMAGE/JPEG"));
        assert!(is_allowed_upload("pic.webp", "image/webp"));
        assert!(!is_allowed_upload("cat.exe", "image/jpeg"));
        assert!(!is_allowed_upload("cat.jpg", "text/plain"));
        assert!(!is_allowed_upload("no-extension", "image/png"));
        assert!(!is_allowed_upload("cat.png", ""));
    }
}
