//! Thin translation layer from a config file + CLI flags onto
//! `toolhost_types::config::HostConfig` (§0 ambient-stack
//! "Configuration").

use std::fs;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};
use toolhost_types::config::HostConfig;

/// Shape of `config.toml`; every field is optional so a missing file
/// (or a sparse one) just falls back to `HostConfig::rooted_at`
/// defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    base_dir: Option<String>,
    tools_root: Option<String>,
    envs_root: Option<String>,
    run_root: Option<String>,
    uploads_root: Option<String>,
    outputs_root: Option<String>,
    blobs_root: Option<String>,
    files_db_path: Option<String>,
    auth_token: Option<String>,
}

/// CLI-supplied overrides, applied after the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub base_dir: Option<String>,
    pub auth_token: Option<String>,
}

/// Load `HostConfig` from `config_path` (if present) and `overrides`,
/// CLI flags beating the file beating `HostConfig::rooted_at` defaults.
/// A missing config file is not an error; an unparsable one is.
pub fn load(config_path: &str, overrides: Overrides) -> Result<HostConfig> {
    let file_config = match fs::read_to_string(config_path) {
        Ok(contents) => toml::from_str(&contents).with_context(|| format!("failed to parse {config_path}"))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = config_path, "no config file found, using defaults");
            FileConfig::default()
        }
        Err(err) => return Err(err).with_context(|| format!("failed to read {config_path}")),
    };

    let base_dir = overrides.base_dir.or(file_config.base_dir).unwrap_or_else(|| "./data".to_string());
    let mut host_config = HostConfig::rooted_at(base_dir);

    if let Some(path) = file_config.tools_root {
        host_config.tools_root = path.into();
    }
    if let Some(path) = file_config.envs_root {
        host_config.envs_root = path.into();
    }
    if let Some(path) = file_config.run_root {
        host_config.run_root = path.into();
    }
    if let Some(path) = file_config.uploads_root {
        host_config.uploads_root = path.into();
    }
    if let Some(path) = file_config.outputs_root {
        host_config.outputs_root = path.into();
    }
    if let Some(path) = file_config.blobs_root {
        host_config.blobs_root = path.into();
    }
    if let Some(path) = file_config.files_db_path {
        host_config.files_db_path = path.into();
    }

    host_config.auth_token = overrides.auth_token.or(file_config.auth_token);
    if host_config.auth_token.is_none() {
        warn!("no auth token configured, the HTTP surface is unauthenticated");
    }

    Ok(host_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_rooted_defaults() {
        let config = load("no-such-config.toml", Overrides { base_dir: Some("/tmp/toolhost-test".to_string()), auth_token: None }).unwrap();
        assert_eq!(config.tools_root, std::path::PathBuf::from("/tmp/toolhost-test/tools"));
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn cli_auth_token_override_wins() {
        let config = load(
            "no-such-config.toml",
            Overrides { base_dir: Some("/tmp/toolhost-test".to_string()), auth_token: Some("secret".to_string()) },
        )
        .unwrap();
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn parses_a_real_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "base_dir = \"/srv/toolhost\"\nauth_token = \"from-file\"\n").unwrap();

        let config = load(path.to_str().unwrap(), Overrides::default()).unwrap();
        assert_eq!(config.tools_root, std::path::PathBuf::from("/srv/toolhost/tools"));
        assert_eq!(config.auth_token.as_deref(), Some("from-file"));
    }
}
