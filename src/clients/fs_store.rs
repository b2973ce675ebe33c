//! Local blob-store backend: SQLite for bucket/object metadata, on-disk
//! payloads sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`.
//!
//! Stands in for an external S3-compatible store, so it follows the same
//! conventions the facade expects from one: listings report ETags wrapped in
//! quote characters, uploads overwrite existing keys, and retrieval URLs are
//! signed links with an expiry timestamp.

use crate::clients::store::{
    ByteStream, BucketInfo, GetResult, ObjectStat, ObjectStore, PutOptions, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use md5::Context;
use sha2::{Digest, Sha256};
use sqlx::{FromRow, SqlitePool};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

/// Apply the embedded schema. Statements are idempotent, so this runs on
/// every startup.
pub async fn init_schema(db: &SqlitePool) -> Result<(), sqlx::Error> {
    let sql = include_str!("../../migrations/0001_init.sql");
    for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(stmt).execute(db).await?;
    }
    Ok(())
}

#[derive(FromRow)]
struct BucketRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ObjectRow {
    key: String,
    content_type: Option<String>,
    size_bytes: i64,
    etag: String,
    last_modified: DateTime<Utc>,
}

impl ObjectRow {
    /// Listings report the ETag with surrounding quotes, matching the wire
    /// convention of S3-style stores.
    fn into_stat(self) -> ObjectStat {
        ObjectStat {
            key: self.key,
            size_bytes: self.size_bytes,
            etag: format!("\"{}\"", self.etag),
            content_type: self.content_type,
            last_modified: self.last_modified,
        }
    }
}

/// Disk + SQLite implementation of [`ObjectStore`].
#[derive(Clone)]
pub struct FsObjectStore {
    db: Arc<SqlitePool>,
    base_path: PathBuf,
    public_url: String,
    url_secret: String,
}

impl FsObjectStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_url: impl Into<String>,
        url_secret: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            url_secret: url_secret.into(),
        }
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects empty/oversized keys, absolute paths, `..` segments, and any
    /// whitespace or control bytes. Whitespace must stay out because keys are
    /// embedded verbatim in presigned URLs.
    fn ensure_key_safe(&self, key: &str) -> StoreResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StoreError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StoreError::InvalidObjectKey);
        }
        if key
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '\\')
        {
            return Err(StoreError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format: 3–63 characters, lowercase letters,
    /// digits, dots, and hyphens, starting and ending with a letter or digit.
    fn ensure_bucket_name_safe(&self, name: &str) -> StoreResult<()> {
        let len = name.len();
        if len < BUCKET_NAME_MIN_LEN || len > BUCKET_NAME_MAX_LEN {
            return Err(StoreError::InvalidBucketName {
                name: name.to_string(),
                reason: "must be between 3 and 63 characters".into(),
            });
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(StoreError::InvalidBucketName {
                name: name.to_string(),
                reason: "allowed characters are lowercase letters, digits, dots, and hyphens"
                    .into(),
            });
        }

        if name.starts_with('.')
            || name.ends_with('.')
            || name.starts_with('-')
            || name.ends_with('-')
        {
            return Err(StoreError::InvalidBucketName {
                name: name.to_string(),
                reason: "must start and end with a lowercase letter or digit".into(),
            });
        }

        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(bucket_name);
        path
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(bucket/key) and returns the first two bytes as lowercase
    /// hexadecimal strings (00–ff). Reduces file count per directory.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_bucket(&self, bucket: &str) -> StoreResult<BucketRow> {
        self.ensure_bucket_name_safe(bucket)?;
        sqlx::query_as::<_, BucketRow>("SELECT id, name, created_at FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_one(&*self.db)
            .await
            .map_err(|err| match err {
                sqlx::Error::RowNotFound => StoreError::BucketNotFound(bucket.to_string()),
                other => StoreError::Sqlx(other),
            })
    }

    async fn fetch_object(&self, bucket: &BucketRow, key: &str) -> StoreResult<ObjectRow> {
        sqlx::query_as::<_, ObjectRow>(
            "SELECT key, content_type, size_bytes, etag, last_modified
             FROM objects WHERE key = ? AND bucket_id = ?",
        )
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StoreError::Sqlx(other),
        })
    }

    fn signature(&self, bucket: &str, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url_secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(bucket.as_bytes());
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Recursively remove empty directories up to the bucket root.
    ///
    /// Stops at the first non-empty or missing directory.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool> {
        self.ensure_bucket_name_safe(bucket)?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_one(&*self.db)
            .await?;
        Ok(count > 0)
    }

    async fn make_bucket(&self, bucket: &str) -> StoreResult<BucketInfo> {
        self.ensure_bucket_name_safe(bucket)?;
        fs::create_dir_all(self.bucket_root(bucket)).await?;

        let created_at = Utc::now();
        let insert = sqlx::query("INSERT INTO buckets (id, name, created_at) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4())
            .bind(bucket)
            .bind(created_at)
            .execute(&*self.db)
            .await;

        match insert {
            Ok(_) => Ok(BucketInfo {
                name: bucket.to_string(),
                created_at,
            }),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::BucketAlreadyExists(bucket.to_string()))
            }
            Err(err) => Err(StoreError::Sqlx(err)),
        }
    }

    async fn remove_bucket(&self, bucket: &str) -> StoreResult<()> {
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM objects WHERE bucket_id = ?")
            .bind(bucket_rec.id)
            .fetch_one(&*self.db)
            .await?;
        if remaining > 0 {
            return Err(StoreError::BucketNotEmpty(bucket.to_string()));
        }

        let result = sqlx::query("DELETE FROM buckets WHERE id = ?")
            .bind(bucket_rec.id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::BucketNotFound(bucket.to_string()));
        }

        let bucket_path = self.bucket_root(bucket);
        if let Err(err) = fs::remove_dir_all(&bucket_path).await {
            if err.kind() != ErrorKind::NotFound {
                debug!(
                    "failed to remove bucket directory {} after delete: {}",
                    bucket_path.display(),
                    err
                );
            }
        }

        Ok(())
    }

    async fn list_buckets(&self) -> StoreResult<Vec<BucketInfo>> {
        let rows = sqlx::query_as::<_, BucketRow>(
            "SELECT id, name, created_at FROM buckets ORDER BY name ASC",
        )
        .fetch_all(&*self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BucketInfo {
                name: row.name,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        opts: PutOptions,
        mut body: ByteStream,
    ) -> StoreResult<ObjectStat> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StoreError::Io(io::Error::other("object path missing parent")))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        while let Some(chunk_res) = body.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        }

        let last_modified = Utc::now();
        let etag = format!("{:x}", digest.compute());

        let insert_result = sqlx::query_as::<_, ObjectRow>(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes, etag,
                description, original_name, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                description = excluded.description,
                original_name = excluded.original_name,
                last_modified = excluded.last_modified
            RETURNING key, content_type, size_bytes, etag, last_modified
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(key)
        .bind(opts.content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(opts.description)
        .bind(opts.original_name)
        .bind(last_modified)
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(row) => Ok(row.into_stat()),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StoreError::Sqlx(err))
            }
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> StoreResult<GetResult> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let row = self.fetch_object(&bucket_rec, key).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StoreError::Io(err)
            }
        })?;

        Ok(GetResult {
            stat: row.into_stat(),
            body: Box::pin(ReaderStream::new(file)),
        })
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let result = sqlx::query("DELETE FROM objects WHERE key = ? AND bucket_id = ?")
            .bind(key)
            .bind(bucket_rec.id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let file_path = self.object_path(&bucket_rec.name, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed payload {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(&bucket_rec.name);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }

        Ok(())
    }

    async fn remove_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<()> {
        for key in keys {
            match self.remove_object(bucket, key).await {
                Ok(()) => {}
                Err(StoreError::ObjectNotFound { .. }) => {
                    debug!("bulk delete: `{}` already gone", key);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn list_objects(&self, bucket: &str) -> StoreResult<Vec<ObjectStat>> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let rows = sqlx::query_as::<_, ObjectRow>(
            "SELECT key, content_type, size_bytes, etag, last_modified
             FROM objects WHERE bucket_id = ? ORDER BY key ASC",
        )
        .bind(bucket_rec.id)
        .fetch_all(&*self.db)
        .await?;

        Ok(rows.into_iter().map(ObjectRow::into_stat).collect())
    }

    async fn presigned_get_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Duration,
    ) -> StoreResult<String> {
        self.ensure_bucket_name_safe(bucket)?;
        self.ensure_key_safe(key)?;

        let expires = Utc::now().timestamp() + expiry.as_secs() as i64;
        let signature = self.signature(bucket, key, expires);
        Ok(format!(
            "{}/presigned/{}/{}?expires={}&signature={}",
            self.public_url, bucket, key, expires, signature
        ))
    }

    async fn verify_presigned(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> StoreResult<bool> {
        if expires < Utc::now().timestamp() {
            return Ok(false);
        }
        Ok(self.signature(bucket, key, expires) == signature)
    }
}

/// Return true if a SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn test_store() -> (FsObjectStore, TempDir) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(
            Arc::new(pool),
            dir.path(),
            "http://localhost:3000",
            "test-secret",
        );
        (store, dir)
    }

    fn body_of(bytes: &'static [u8]) -> ByteStream {
        Box::pin(futures::stream::once(async move {
            Ok(Bytes::from_static(bytes))
        }))
    }

    async fn read_all(mut body: ByteStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn bucket_lifecycle_roundtrip() {
        let (store, _dir) = test_store().await;

        assert!(!store.bucket_exists("pets").await.unwrap());
        store.make_bucket("pets").await.unwrap();
        assert!(store.bucket_exists("pets").await.unwrap());

        let buckets = store.list_buckets().await.unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].name, "pets");

        store.remove_bucket("pets").await.unwrap();
        assert!(!store.bucket_exists("pets").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_bucket_is_rejected() {
        let (store, _dir) = test_store().await;
        store.make_bucket("pets").await.unwrap();
        let err = store.make_bucket("pets").await.unwrap_err();
        assert!(matches!(err, StoreError::BucketAlreadyExists(name) if name == "pets"));
    }

    #[tokio::test]
    async fn removing_missing_bucket_fails() {
        let (store, _dir) = test_store().await;
        let err = store.remove_bucket("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn put_then_get_roundtrips_payload_and_quotes_etag() {
        let (store, _dir) = test_store().await;
        store.make_bucket("pets").await.unwrap();

        let opts = PutOptions {
            content_type: Some("image/png".into()),
            description: Some("a cat".into()),
            original_name: Some("cat.png".into()),
        };
        let stat = store
            .put_object("pets", "cat.png", opts, body_of(b"hello"))
            .await
            .unwrap();

        assert_eq!(stat.size_bytes, 5);
        // md5("hello"), wrapped in the store's quote convention
        assert_eq!(stat.etag, "\"5d41402abc4b2a76b9719d911017c592\"");

        let fetched = store.get_object("pets", "cat.png").await.unwrap();
        assert_eq!(fetched.stat.etag, stat.etag);
        assert_eq!(fetched.stat.content_type.as_deref(), Some("image/png"));
        assert_eq!(read_all(fetched.body).await, b"hello");
    }

    #[tokio::test]
    async fn put_overwrites_existing_key() {
        let (store, _dir) = test_store().await;
        store.make_bucket("pets").await.unwrap();

        store
            .put_object("pets", "cat.png", PutOptions::default(), body_of(b"one"))
            .await
            .unwrap();
        let second = store
            .put_object("pets", "cat.png", PutOptions::default(), body_of(b"twotwo"))
            .await
            .unwrap();

        let listing = store.list_objects("pets").await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].etag, second.etag);
        assert_eq!(listing[0].size_bytes, 6);
    }

    #[tokio::test]
    async fn remove_bucket_refuses_when_occupied() {
        let (store, _dir) = test_store().await;
        store.make_bucket("pets").await.unwrap();
        store
            .put_object("pets", "cat.png", PutOptions::default(), body_of(b"x"))
            .await
            .unwrap();

        let err = store.remove_bucket("pets").await.unwrap_err();
        assert!(matches!(err, StoreError::BucketNotEmpty(_)));

        store.remove_object("pets", "cat.png").await.unwrap();
        store.remove_bucket("pets").await.unwrap();
    }

    #[tokio::test]
    async fn listing_missing_bucket_fails() {
        let (store, _dir) = test_store().await;
        let err = store.list_objects("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn remove_objects_skips_missing_keys() {
        let (store, _dir) = test_store().await;
        store.make_bucket("pets").await.unwrap();
        store
            .put_object("pets", "a.png", PutOptions::default(), body_of(b"a"))
            .await
            .unwrap();

        store
            .remove_objects("pets", &["a.png".to_string(), "gone.png".to_string()])
            .await
            .unwrap();
        assert!(store.list_objects("pets").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn presigned_url_verifies_and_rejects_tampering() {
        let (store, _dir) = test_store().await;
        let url = store
            .presigned_get_url("pets", "cat.png", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:3000/presigned/pets/cat.png?expires="));

        let query = url.split_once('?').unwrap().1;
        let mut expires = 0_i64;
        let mut signature = String::new();
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            match k {
                "expires" => expires = v.parse().unwrap(),
                "signature" => signature = v.to_string(),
                _ => {}
            }
        }

        assert!(
            store
                .verify_presigned("pets", "cat.png", expires, &signature)
                .await
                .unwrap()
        );
        assert!(
            !store
                .verify_presigned("pets", "dog.png", expires, &signature)
                .await
                .unwrap()
        );
        assert!(
            !store
                .verify_presigned("pets", "cat.png", expires - 1, &signature)
                .await
                .unwrap()
        );
        // An expiry in the past fails even with a matching signature.
        let stale = Utc::now().timestamp() - 10;
        let stale_sig = store.signature("pets", "cat.png", stale);
        assert!(
            !store
                .verify_presigned("pets", "cat.png", stale, &stale_sig)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn unsafe_keys_and_names_are_rejected() {
        let (store, _dir) = test_store().await;
        store.make_bucket("pets").await.unwrap();

        for key in ["../evil", "/abs", "has space.png", ""] {
            let err = store
                .put_object("pets", key, PutOptions::default(), body_of(b"x"))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::InvalidObjectKey), "key {key:?}");
        }

        let err = store.make_bucket("Bad_Name").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidBucketName { .. }));
    }
}
