//! Semantic search over indexed captions, reconciled against the store.
//!
//! The index is advisory: it may hold captions for objects that have since
//! been deleted, because nothing removes caption records on object delete.
//! The store is ground truth for existence, so every hit is joined against a
//! live listing of its bucket and dropped when the join fails.

use crate::{
    clients::{
        ClientError,
        store::{ObjectStore, StoreError, clean_etag, etags_match},
        vector_index::CaptionIndex,
    },
    errors::ApiError,
    models::search::SearchMatch,
};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct SearchService {
    store: Arc<dyn ObjectStore>,
    index: Arc<dyn CaptionIndex>,
}

impl SearchService {
    pub fn new(store: Arc<dyn ObjectStore>, index: Arc<dyn CaptionIndex>) -> Self {
        Self { store, index }
    }

    /// Query the index, then attach live object metadata to each hit.
    ///
    /// Result order follows the index's ranking. Hits whose bucket or object
    /// no longer exists are dropped silently; an index failure is surfaced
    /// with its original status code and body.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchMatch>, ApiError> {
        if query.trim().is_empty() {
            return Err(ApiError::InvalidInput("Query text is required.".to_string()));
        }

        let hits = self
            .index
            .search_captions(query, limit)
            .await
            .map_err(|err| match err {
                ClientError::Status { status, body, .. } => ApiError::IndexUnavailable {
                    status,
                    message: "Vector store search failed.".to_string(),
                    details: body,
                },
                other => ApiError::Dependency(other.to_string()),
            })?;

        let mut matches = Vec::with_capacity(hits.len());
        for hit in hits {
            let objects = match self.store.list_objects(&hit.bucket).await {
                Ok(objects) => objects,
                Err(StoreError::BucketNotFound(_)) => {
                    debug!(bucket = %hit.bucket, etag = %hit.etag, "dropping hit: bucket gone");
                    continue;
                }
                Err(other) => return Err(other.into()),
            };

            match objects.iter().find(|obj| etags_match(&obj.etag, &hit.etag)) {
                Some(obj) => matches.push(SearchMatch {
                    etag: clean_etag(&hit.etag).to_string(),
                    caption: hit.caption,
                    score: hit.score,
                    bucket: hit.bucket,
                    object_name: obj.key.clone(),
                    size: obj.size_bytes,
                    last_modified: obj.last_modified,
                }),
                None => {
                    debug!(bucket = %hit.bucket, etag = %hit.etag, "dropping stale hit");
                }
            }
        }

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{
        fs_store::{FsObjectStore, init_schema},
        store::{ByteStream, PutOptions},
        vector_index::IndexHit,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    enum FakeIndex {
        Hits(Vec<IndexHit>),
        Fail { status: u16, body: &'static str },
    }

    #[async_trait]
    impl CaptionIndex for FakeIndex {
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
            match self {
                FakeIndex::Hits(hits) => Ok(hits.clone()),
                FakeIndex::Fail { status, body } => Err(ClientError::Status {
                    service: "vector index",
                    status: *status,
                    body: (*body).to_string(),
                }),
            }
        }
    }

    async fn test_store() -> (Arc<FsObjectStore>, TempDir) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FsObjectStore::new(
            Arc::new(pool),
            dir.path(),
            "http://localhost:3000",
            "test-secret",
        ));
        (store, dir)
    }

    fn body_of(bytes: &'static [u8]) -> ByteStream {
        Box::pin(futures::stream::once(async move {
            Ok(Bytes::from_static(bytes))
        }))
    }

    fn hit(etag: &str, bucket: &str, score: f64) -> IndexHit {
        IndexHit {
            etag: etag.to_string(),
            caption: format!("caption for {etag}"),
            score,
            bucket: bucket.to_string(),
        }
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let (store, _dir) = test_store().await;
        let service = SearchService::new(store, Arc::new(FakeIndex::Hits(Vec::new())));

        for query in ["", "   ", "\t"] {
            let err = service.search(query, 5).await.unwrap_err();
            assert!(matches!(err, ApiError::InvalidInput(_)), "query {query:?}");
        }
    }

    #[tokio::test]
    async fn index_failure_passes_status_and_body_through() {
        let (store, _dir) = test_store().await;
        let service = SearchService::new(
            store,
            Arc::new(FakeIndex::Fail {
                status: 503,
                body: "index rebuilding",
            }),
        );

        let err = service.search("cats", 5).await.unwrap_err();
        match err {
            ApiError::IndexUnavailable {
                status, details, ..
            } => {
                assert_eq!(status, 503);
                assert_eq!(details, "index rebuilding");
            }
            other => panic!("expected IndexUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hits_are_joined_with_live_metadata_and_stale_ones_dropped() {
        let (store, _dir) = test_store().await;
        store.make_bucket("pets").await.unwrap();
        let stat = store
            .put_object(
                "pets",
                "cat.png",
                PutOptions {
                    content_type: Some("image/png".into()),
                    ..Default::default()
                },
                body_of(b"png bytes"),
            )
            .await
            .unwrap();
        let live_etag = clean_etag(&stat.etag).to_string();

        let hits = vec![
            // matching object, etag case-flipped to exercise the comparison
            hit(&live_etag.to_ascii_uppercase(), "pets", 0.91),
            // object deleted after indexing
            hit("feedfacefeedfacefeedfacefeedface", "pets", 0.72),
            // whole bucket deleted after indexing
            hit("cafebabecafebabecafebabecafebabe", "attic", 0.55),
        ];
        let service = SearchService::new(store, Arc::new(FakeIndex::Hits(hits)));

        let matches = service.search("a cat", 5).await.unwrap();
        assert_eq!(matches.len(), 1);
        let found = &matches[0];
        assert_eq!(found.etag.to_ascii_lowercase(), live_etag);
        assert_eq!(found.object_name, "cat.png");
        assert_eq!(found.bucket, "pets");
        assert_eq!(found.size, 9);
        assert_eq!(found.score, 0.91);
        assert_eq!(found.caption, format!("caption for {}", live_etag.to_ascii_uppercase()));
    }

    #[tokio::test]
    async fn result_order_follows_the_index_ranking() {
        let (store, _dir) = test_store().await;
        store.make_bucket("pets").await.unwrap();
        let first = store
            .put_object("pets", "a.png", PutOptions::default(), body_of(b"aa"))
            .await
            .unwrap();
        let second = store
            .put_object("pets", "b.png", PutOptions::default(), body_of(b"bb"))
            .await
            .unwrap();

        let hits = vec![
            hit(clean_etag(&second.etag), "pets", 0.9),
            hit(clean_etag(&first.etag), "pets", 0.4),
        ];
        let service = SearchService::new(store, Arc::new(FakeIndex::Hits(hits)));

        let matches = service.search("pets", 5).await.unwrap();
        let keys: Vec<&str> = matches.iter().map(|m| m.object_name.as_str()).collect();
        assert_eq!(keys, ["b.png", "a.png"]);
    }
}
