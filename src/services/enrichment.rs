//! Caption enrichment pipeline.
//!
//! Each successful upload schedules one detached run: issue a time-limited
//! retrieval URL, ask the caption service to describe the image, then upsert
//! the caption into the vector index under the object's fingerprint.
//!
//! A run gets exactly one attempt. Failures are logged and dropped — the
//! uploader already got its response, and the object simply stays
//! unsearchable. In-flight runs are bounded by a semaphore so an upload burst
//! cannot fan out without limit, and each run carries a timeout so a stalled
//! dependency cannot pin a permit forever.

use crate::clients::{
    ClientError,
    caption::CaptionService,
    store::{ObjectStore, StoreError},
    vector_index::CaptionIndex,
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Lifetime of the retrieval URL handed to the caption service.
const RETRIEVAL_URL_TTL: Duration = Duration::from_secs(60 * 60 * 24);

#[derive(Debug, Error)]
enum EnrichError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Work item produced by a successful upload.
#[derive(Clone, Debug)]
pub struct EnrichmentJob {
    pub bucket: String,
    pub key: String,
    /// Quote-stripped fingerprint, as returned to the uploader.
    pub etag: String,
}

#[derive(Clone)]
pub struct EnrichmentPipeline {
    store: Arc<dyn ObjectStore>,
    captioner: Arc<dyn CaptionService>,
    index: Arc<dyn CaptionIndex>,
    permits: Arc<Semaphore>,
    run_timeout: Duration,
}

impl EnrichmentPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        captioner: Arc<dyn CaptionService>,
        index: Arc<dyn CaptionIndex>,
        max_concurrent: usize,
        run_timeout: Duration,
    ) -> Self {
        Self {
            store,
            captioner,
            index,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            run_timeout,
        }
    }

    /// Fire and forget. Returns immediately; the run proceeds on its own
    /// task, detached from the caller's cancellation scope. When all permits
    /// are taken the run waits its turn instead of piling on.
    pub fn schedule(&self, job: EnrichmentJob) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            let _permit = match pipeline.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                // Closed semaphore means shutdown; drop the run.
                Err(_) => return,
            };

            match tokio::time::timeout(pipeline.run_timeout, pipeline.run(&job)).await {
                Ok(Ok(caption)) => {
                    info!(
                        bucket = %job.bucket,
                        key = %job.key,
                        %caption,
                        "caption indexed"
                    );
                }
                Ok(Err(err)) => {
                    warn!(
                        bucket = %job.bucket,
                        key = %job.key,
                        error = %err,
                        "caption enrichment failed; object stays unsearchable"
                    );
                }
                Err(_) => {
                    warn!(
                        bucket = %job.bucket,
                        key = %job.key,
                        timeout_secs = pipeline.run_timeout.as_secs(),
                        "caption enrichment timed out"
                    );
                }
            }
        });
    }

    async fn run(&self, job: &EnrichmentJob) -> Result<String, EnrichError> {
        let image_url = self
            .store
            .presigned_get_url(&job.bucket, &job.key, RETRIEVAL_URL_TTL)
            .await?;
        let caption = self.captioner.caption(&image_url).await?;
        self.index
            .add_caption(&job.etag, &caption, &job.bucket)
            .await?;
        Ok(caption)
    }
}
