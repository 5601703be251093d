//! The file record (§3: "File record").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata row for one stored file. The blob itself lives at
/// `{blobs_root}/{id}`, with no extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Stable identifier, also the blob's filename.
    pub id: Uuid,
    /// Caller-supplied display name, kept for presentation only.
    pub name: String,
    /// Size of the blob in bytes.
    pub size: u64,
    /// Lowercase hex SHA-256 of the blob's contents at import time.
    pub digest: String,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// Unix timestamp the row expires at; `0` means permanent.
    pub expires_at: i64,
}

impl FileInfo {
    /// Whether this row is expired as of `now` (§4.6: `0 < expires_at <= now`).
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at > 0 && self.expires_at <= now
    }
}
