use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use toolhost_types::manifest::MANIFEST_FILENAME;
use toolhost_types::ToolManifest;
use tracing::{debug, warn};

use crate::error::RegistryError;

/// Where a tool's source lives, as distinguished by `InstallSource::parse`
/// (§4.2: "a local directory reference or a remote source URL").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallSource {
    /// An absolute, relative, or home-relative filesystem path.
    Local(PathBuf),
    /// A remote source-control URL, fetched via a shallow clone.
    Remote(String),
}

impl InstallSource {
    /// Classify a source string. Anything containing `://` is treated as
    /// remote; `~/`-prefixed paths are expanded against `$HOME`; anything
    /// else is treated as a (possibly relative) filesystem path.
    pub fn parse(raw: &str) -> Self {
        if raw.contains("://") {
            return InstallSource::Remote(raw.to_string());
        }
        if let Some(rest) = raw.strip_prefix("~/") {
            let home = std::env::var("HOME").unwrap_or_default();
            return InstallSource::Local(PathBuf::from(home).join(rest));
        }
        InstallSource::Local(PathBuf::from(raw))
    }
}

async fn read_manifest(dir: &Path) -> Result<ToolManifest, RegistryError> {
    let manifest_path = dir.join(MANIFEST_FILENAME);
    let raw = tokio::fs::read_to_string(&manifest_path)
        .await
        .map_err(|source| RegistryError::Io { path: manifest_path.clone(), source })?;
    Ok(ToolManifest::parse(&raw, &manifest_path)?)
}

/// Materialise `source` under `tools_root`, returning the final directory
/// and its parsed manifest. Fails with `AlreadyInstalled` if a tool of the
/// same name already exists.
pub async fn materialize(
    tools_root: &Path,
    source: &InstallSource,
) -> Result<(PathBuf, ToolManifest), RegistryError> {
    tokio::fs::create_dir_all(tools_root)
        .await
        .map_err(|source| RegistryError::Io { path: tools_root.to_path_buf(), source })?;

    match source {
        InstallSource::Local(path) => {
            let canonical = tokio::fs::canonicalize(path)
                .await
                .map_err(|source| RegistryError::Io { path: path.clone(), source })?;
            let manifest = read_manifest(&canonical).await?;
            let target = tools_root.join(&manifest.name);

            if tokio::fs::symlink_metadata(&target).await.is_ok() {
                return Err(RegistryError::AlreadyInstalled { name: manifest.name });
            }

            debug!(tool = %manifest.name, from = %canonical.display(), to = %target.display(), "symlinking local tool");
            tokio::fs::symlink(&canonical, &target)
                .await
                .map_err(|source| RegistryError::Io { path: target.clone(), source })?;

            Ok((target, manifest))
        }
        InstallSource::Remote(url) => {
            let staging = tempfile::tempdir()
                .map_err(|source| RegistryError::Io { path: tools_root.to_path_buf(), source })?
                .into_path();

            let output = Command::new("git")
                .arg("clone")
                .arg("--depth")
                .arg("1")
                .arg(url)
                .arg(&staging)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
                .map_err(|source| RegistryError::Io { path: staging.clone(), source })?;

            if !output.status.success() {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(RegistryError::FetchFailed {
                    source: url.clone(),
                    reason: String::from_utf8_lossy(&output.stderr).to_string(),
                });
            }

            let manifest = match read_manifest(&staging).await {
                Ok(manifest) => manifest,
                Err(err) => {
                    let _ = tokio::fs::remove_dir_all(&staging).await;
                    return Err(err);
                }
            };

            let target = tools_root.join(&manifest.name);
            if tokio::fs::symlink_metadata(&target).await.is_ok() {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(RegistryError::AlreadyInstalled { name: manifest.name });
            }

            debug!(tool = %manifest.name, to = %target.display(), "renaming fetched tool into place");
            tokio::fs::rename(&staging, &target)
                .await
                .map_err(|source| RegistryError::Io { path: target.clone(), source })?;

            Ok((target, manifest))
        }
    }
}

/// Remove a materialised tool directory, tolerating the fact that it may
/// be a symlink (local install) or a real directory (remote install).
pub async fn cleanup(target: &Path) {
    if tokio::fs::remove_file(target).await.is_ok() {
        return;
    }
    if let Err(err) = tokio::fs::remove_dir_all(target).await {
        warn!(path = %target.display(), error = %err, "failed to clean up materialised tool directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_classifies_remote_urls() {
        assert_eq!(
            InstallSource::parse("https://example.com/tool.git"),
            InstallSource::Remote("https://example.com/tool.git".to_string())
        );
    }

    #[test]
    fn parse_classifies_absolute_and_relative_paths_as_local() {
        assert_eq!(InstallSource::parse("/opt/tools/calc"), InstallSource::Local(PathBuf::from("/opt/tools/calc")));
        assert_eq!(InstallSource::parse("./calc"), InstallSource::Local(PathBuf::from("./calc")));
    }

    #[test]
    fn parse_expands_home_relative_paths() {
        std::env::set_var("HOME", "/home/toolhost");
        assert_eq!(InstallSource::parse("~/tools/calc"), InstallSource::Local(PathBuf::from("/home/toolhost/tools/calc")));
    }
}
