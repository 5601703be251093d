//! The legacy per-call output-ref manager (§4.5 "Output wrapping", §4.6
//! closing paragraph).
//!
//! Unlike [`crate::FileStore`] this manager is not persistent: it exists
//! only so a tool's `file`-typed result fields can be handed back as a
//! small HTTP-addressable reference instead of a raw filesystem path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LEN: usize = 12;

/// One wrapped output: a copy of a tool result file under the outputs
/// directory, addressable by `id` (§4.5: "replaces the value with a
/// reference object").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputRef {
    /// Short random identifier; also the last path segment of `url`.
    #[serde(rename = "ref")]
    pub id: String,
    /// Path clients should fetch the bytes from.
    pub url: String,
    /// Absolute filesystem path of the copy.
    pub path: PathBuf,
    /// Size of the copy in bytes.
    pub size: u64,
    /// Best-effort media type, derived from the file extension.
    pub media_type: String,
    /// When the copy was made.
    pub created_at: DateTime<Utc>,
}

/// In-memory registry of [`OutputRef`]s, backed by files under
/// `outputs_root`.
pub struct OutputRefManager {
    outputs_root: PathBuf,
    refs: RwLock<HashMap<String, OutputRef>>,
}

impl OutputRefManager {
    /// A manager rooted at `outputs_root`, with an empty catalogue.
    pub fn new(outputs_root: impl Into<PathBuf>) -> Self {
        Self { outputs_root: outputs_root.into(), refs: RwLock::new(HashMap::new()) }
    }

    /// Copy `source` into the outputs directory under a fresh short id,
    /// preserving its extension, and register the resulting ref. `url_base`
    /// is prefixed to the generated path to build `url` (e.g.
    /// `/v1/files`).
    pub async fn wrap(&self, source: &Path, url_base: &str) -> Result<OutputRef, StoreError> {
        let id = generate_id();
        let extension = source.extension().and_then(|ext| ext.to_str());
        let filename = match extension {
            Some(ext) => format!("{id}.{ext}"),
            None => id.clone(),
        };

        tokio::fs::create_dir_all(&self.outputs_root)
            .await
            .map_err(|source_err| StoreError::Io { path: self.outputs_root.clone(), source: source_err })?;

        let dest = self.outputs_root.join(&filename);
        tokio::fs::copy(source, &dest).await.map_err(|source_err| StoreError::Io { path: dest.clone(), source: source_err })?;

        let size = tokio::fs::metadata(&dest)
            .await
            .map_err(|source_err| StoreError::Io { path: dest.clone(), source: source_err })?
            .len();

        let media_type = mime_guess::from_path(&dest).first_or_octet_stream().to_string();

        let output_ref = OutputRef {
            id: id.clone(),
            url: format!("{}/{}", url_base.trim_end_matches('/'), filename),
            path: dest,
            size,
            media_type,
            created_at: Utc::now(),
        };

        self.refs.write().expect("output-ref map lock is never held across an await point").insert(id, output_ref.clone());
        Ok(output_ref)
    }

    /// Look up a previously wrapped output by id.
    pub fn get(&self, id: &str) -> Option<OutputRef> {
        self.refs.read().expect("output-ref map lock is never held across an await point").get(id).cloned()
    }

    /// Forget and delete a previously wrapped output.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let output_ref = self
            .refs
            .write()
            .expect("output-ref map lock is never held across an await point")
            .remove(id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        match tokio::fs::remove_file(&output_ref.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path: output_ref.path, source }),
        }
    }
}

fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LEN).map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrap_copies_file_and_derives_media_type() {
        let source_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("report.json");
        tokio::fs::write(&source, b"{}").await.unwrap();

        let outputs_dir = tempfile::tempdir().unwrap();
        let manager = OutputRefManager::new(outputs_dir.path());
        let output_ref = manager.wrap(&source, "/v1/files").await.unwrap();

        assert_eq!(output_ref.size, 2);
        assert_eq!(output_ref.media_type, "application/json");
        assert!(output_ref.url.starts_with("/v1/files/"));
        assert!(output_ref.path.exists());

        let fetched = manager.get(&output_ref.id).unwrap();
        assert_eq!(fetched.path, output_ref.path);
    }

    #[tokio::test]
    async fn delete_removes_file_and_forgets_ref() {
        let source_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("a.txt");
        tokio::fs::write(&source, b"hi").await.unwrap();

        let outputs_dir = tempfile::tempdir().unwrap();
        let manager = OutputRefManager::new(outputs_dir.path());
        let output_ref = manager.wrap(&source, "/v1/files").await.unwrap();

        manager.delete(&output_ref.id).await.unwrap();
        assert!(manager.get(&output_ref.id).is_none());
        assert!(!output_ref.path.exists());
    }
}
