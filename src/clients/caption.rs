//! Client for the image caption service.
//!
//! Contract: `POST {base}/caption {"image_url": ...}` returns
//! `{"caption": ...}`. The service fetches the image itself, so it is handed
//! a time-limited retrieval URL rather than the payload.

use crate::clients::ClientError;
use async_trait::async_trait;
use serde_json::{Value, json};

#[async_trait]
pub trait CaptionService: Send + Sync {
    /// Produce a short natural-language caption for the image behind `image_url`.
    async fn caption(&self, image_url: &str) -> Result<String, ClientError>;
}

pub struct HttpCaptionClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCaptionClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CaptionService for HttpCaptionClient {
    async fn caption(&self, image_url: &str) -> Result<String, ClientError> {
        let response = self
            .client
            .post(format!("{}/caption", self.base_url))
            .json(&json!({ "image_url": image_url }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                service: "caption service",
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value = response.json().await?;
        parsed
            .get("caption")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(ClientError::MalformedResponse {
                service: "caption service",
                field: "caption",
            })
    }
}
