//! Bucket representations for bucket CRUD responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the `GET /buckets` listing.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BucketSummary {
    /// Bucket name.
    pub name: String,

    /// When the bucket was created.
    pub created: DateTime<Utc>,
}
