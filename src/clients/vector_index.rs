//! Client for the caption vector index.
//!
//! Contract: `POST /add_caption {etag, caption, bucket}` upserts a caption
//! record; `POST /search_captions {query, limit}` returns ranked hits. The
//! index owns caption records outright — nothing here deletes them when the
//! backing object goes away.

use crate::clients::ClientError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// One ranked hit from the index, before reconciliation against the store.
#[derive(Deserialize, Clone, Debug)]
pub struct IndexHit {
    pub etag: String,
    pub caption: String,
    pub score: f64,
    pub bucket: String,
}

#[derive(Deserialize, Debug)]
struct SearchResponse {
    results: Vec<IndexHit>,
}

#[async_trait]
pub trait CaptionIndex: Send + Sync {
    /// Index a caption under the object's fingerprint.
    async fn add_caption(
        &self,
        etag: &str,
        caption: &str,
        bucket: &str,
    ) -> Result<(), ClientError>;

    /// Free-text search over indexed captions, ranked by score descending.
    async fn search_captions(&self, query: &str, limit: usize)
    -> Result<Vec<IndexHit>, ClientError>;
}

pub struct HttpVectorIndex {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVectorIndex {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CaptionIndex for HttpVectorIndex {
    async fn add_caption(
        &self,
        etag: &str,
        caption: &str,
        bucket: &str,
    ) -> Result<(), ClientError> {
        let response = self
            .client
            .post(format!("{}/add_caption", self.base_url))
            .json(&json!({ "etag": etag, "caption": caption, "bucket": bucket }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                service: "vector index",
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn search_captions(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<IndexHit>, ClientError> {
        let response = self
            .client
            .post(format!("{}/search_captions", self.base_url))
            .json(&json!({ "query": query, "limit": limit }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                service: "vector index",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.results)
    }
}
