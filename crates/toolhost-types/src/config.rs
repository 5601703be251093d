//! Host-wide configuration: filesystem layout and the optional auth token.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Resolved configuration for a single host process (§2, §6).
///
/// Every path is absolute by the time this struct is built — `toolhost-cli`
/// is responsible for joining relative config values against a base
/// directory before constructing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Directory containing one subdirectory per installed tool.
    pub tools_root: PathBuf,

    /// Directory holding provisioned environments (e.g. per-tool venvs).
    pub envs_root: PathBuf,

    /// Scratch directory for persistent-mode child working directories.
    pub run_root: PathBuf,

    /// Directory multipart uploads are spooled into before a call.
    pub uploads_root: PathBuf,

    /// Directory legacy per-call output references are written under.
    pub outputs_root: PathBuf,

    /// Directory content-addressed file store blobs are written under.
    pub blobs_root: PathBuf,

    /// Path to the SQLite database backing the file store's metadata.
    pub files_db_path: PathBuf,

    /// Bearer token required on every request when set; `None` disables
    /// auth entirely (§4.5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl HostConfig {
    /// Build a `HostConfig` with every path rooted under `base`, using the
    /// conventional subdirectory names.
    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            tools_root: base.join("tools"),
            envs_root: base.join("envs"),
            run_root: base.join("run"),
            uploads_root: base.join("uploads"),
            outputs_root: base.join("outputs"),
            blobs_root: base.join("blobs"),
            files_db_path: base.join("files.db"),
            auth_token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_at_lays_out_conventional_subdirectories() {
        let config = HostConfig::rooted_at("/var/lib/toolhost");
        assert_eq!(config.tools_root, PathBuf::from("/var/lib/toolhost/tools"));
        assert_eq!(config.files_db_path, PathBuf::from("/var/lib/toolhost/files.db"));
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let mut config = HostConfig::rooted_at("/srv/toolhost");
        config.auth_token = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        let back: HostConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.auth_token.as_deref(), Some("secret"));
        assert_eq!(back.tools_root, config.tools_root);
    }
}
