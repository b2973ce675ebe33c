//! Object representations for listing and upload responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the per-bucket object listing.
///
/// The fingerprint is reported with the store's surrounding quotes already
/// stripped, matching what the upload response hands out as `id`.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSummary {
    /// Object key within its bucket (typically the original filename).
    pub key: String,

    /// Payload size in bytes.
    pub size: i64,

    /// Timestamp of the last write.
    pub last_modified: DateTime<Utc>,

    /// Content fingerprint assigned by the store.
    pub etag: String,
}

/// Response body of a successful upload.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    /// The object's content fingerprint, quote-stripped. Used as the address
    /// for later download and delete calls.
    pub id: String,

    /// Key the object was stored under.
    pub object_name: String,

    /// Caller-supplied description attached as metadata.
    pub description: String,
}
