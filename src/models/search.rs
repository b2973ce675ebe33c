//! Search result representations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A search hit joined with live object metadata.
///
/// Hits whose backing object has been deleted since indexing never make it
/// into a response; they are dropped during reconciliation.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    /// Content fingerprint the index stored for this caption.
    pub etag: String,

    /// Caption text the hit was ranked by.
    pub caption: String,

    /// Similarity score, as ranked by the index.
    pub score: f64,

    /// Bucket the object lives in.
    pub bucket: String,

    /// Current object key, from the live listing.
    pub object_name: String,

    /// Current payload size in bytes.
    pub size: i64,

    /// Current last-modified timestamp.
    pub last_modified: DateTime<Utc>,
}
