use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use toolhost_provisioner::Provisioner;
use tracing::{info, instrument, warn};

use crate::error::RegistryError;
use crate::install::{self, InstallSource};
use crate::model::{HealthStatus, Tool, ToolStatus, ToolSummary};

/// In-memory catalogue of installed tools (§4.2).
///
/// Holds no process state itself — `status`/`health_status` on each
/// [`Tool`] are a cache of what the executor and health supervisor last
/// reported, updated via [`ToolRegistry::set_status`] and
/// [`ToolRegistry::record_health`].
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Tool>>>,
    tools_root: PathBuf,
    provisioner: Arc<dyn Provisioner>,
}

impl ToolRegistry {
    /// An empty registry rooted at `tools_root`, provisioning environments
    /// via `provisioner`.
    pub fn new(tools_root: impl Into<PathBuf>, provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
            tools_root: tools_root.into(),
            provisioner,
        }
    }

    /// Install a tool from a local directory reference or a remote source
    /// URL (§4.2).
    #[instrument(skip(self))]
    pub async fn install(&self, source: &str) -> Result<ToolSummary, RegistryError> {
        let source = InstallSource::parse(source);
        let (target, manifest) = install::materialize(&self.tools_root, &source).await?;

        match self.provisioner.ensure(&manifest).await {
            Ok((environment, _fresh)) => {
                let mut tool = Tool::new(manifest.name.clone(), target, manifest);
                tool.environment = Some(environment);
                let summary = tool.summary();

                let mut tools = self.tools.write().await;
                if tools.contains_key(&tool.name) {
                    drop(tools);
                    install::cleanup(&tool.location).await;
                    return Err(RegistryError::AlreadyInstalled { name: summary.name });
                }
                info!(tool = %tool.name, "installed");
                tools.insert(tool.name.clone(), tool);
                Ok(summary)
            }
            Err(err) => {
                install::cleanup(&target).await;
                Err(RegistryError::Provision(err))
            }
        }
    }

    /// Scan `tools_root` and populate the catalogue, following symlinked
    /// entries. Entries that fail to parse are logged and skipped; one bad
    /// tool never blocks another (§4.2).
    #[instrument(skip(self))]
    pub async fn scan(&self) -> Result<usize, RegistryError> {
        let mut read_dir = match tokio::fs::read_dir(&self.tools_root).await {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => return Err(RegistryError::Io { path: self.tools_root.clone(), source }),
        };

        let mut loaded = 0usize;
        loop {
            let entry = match read_dir.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "failed to read tools root entry");
                    continue;
                }
            };

            let path = entry.path();
            let manifest_path = path.join(toolhost_types::manifest::MANIFEST_FILENAME);
            let raw = match tokio::fs::read_to_string(&manifest_path).await {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(path = %manifest_path.display(), error = %err, "skipping entry without a readable manifest");
                    continue;
                }
            };

            let manifest = match toolhost_types::ToolManifest::parse(&raw, &manifest_path) {
                Ok(manifest) => manifest,
                Err(err) => {
                    warn!(path = %manifest_path.display(), error = %err, "skipping entry with an invalid manifest");
                    continue;
                }
            };

            let name = manifest.name.clone();
            let tool = Tool::new(name.clone(), path, manifest);
            self.tools.write().await.insert(name, tool);
            loaded += 1;
        }

        info!(loaded, "scan complete");
        Ok(loaded)
    }

    /// Look up a tool's current snapshot by name.
    pub async fn get(&self, name: &str) -> Option<Tool> {
        self.tools.read().await.get(name).cloned()
    }

    /// Return the tool's provisioned environment, provisioning it now if
    /// this is the first call to need it (§4.3, §4.4.4: "ensures the
    /// environment is provisioned").
    pub async fn ensure_environment(
        &self,
        name: &str,
    ) -> Result<toolhost_provisioner::EnvironmentHandle, RegistryError> {
        if let Some(existing) = self.tools.read().await.get(name).and_then(|tool| tool.environment.clone()) {
            return Ok(existing);
        }

        let manifest = self
            .tools
            .read()
            .await
            .get(name)
            .map(|tool| tool.manifest.clone())
            .ok_or_else(|| RegistryError::NotFound { name: name.to_string() })?;

        let (handle, _fresh) = self.provisioner.ensure(&manifest).await?;

        let mut tools = self.tools.write().await;
        if let Some(tool) = tools.get_mut(name) {
            tool.environment = Some(handle.clone());
        }
        Ok(handle)
    }

    /// Summary view of every installed tool (§4.2).
    pub async fn list_summaries(&self) -> Vec<ToolSummary> {
        self.tools.read().await.values().map(Tool::summary).collect()
    }

    /// Update a tool's lifecycle status, as reported by the executor.
    pub async fn set_status(&self, name: &str, status: ToolStatus) -> Result<(), RegistryError> {
        let mut tools = self.tools.write().await;
        let tool = tools.get_mut(name).ok_or_else(|| RegistryError::NotFound { name: name.to_string() })?;
        tool.status = status;
        Ok(())
    }

    /// Record the outcome of a health-supervisor tick (§4.4.5): `healthy`
    /// resets the failure counter; `unhealthy` increments it and flips the
    /// tool to `unhealthy` once the configured threshold is reached.
    pub async fn record_health(&self, name: &str, healthy: bool) -> Result<HealthStatus, RegistryError> {
        let mut tools = self.tools.write().await;
        let tool = tools.get_mut(name).ok_or_else(|| RegistryError::NotFound { name: name.to_string() })?;

        let threshold = tool.manifest.health.as_ref().map(|h| h.failure_threshold).unwrap_or(3);

        if healthy {
            tool.consecutive_failures = 0;
            tool.health_status = Some(HealthStatus::Healthy);
        } else {
            tool.consecutive_failures += 1;
            if tool.consecutive_failures >= threshold {
                tool.health_status = Some(HealthStatus::Unhealthy);
            }
        }

        Ok(tool.health_status.unwrap_or(HealthStatus::Unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use toolhost_provisioner::{EnvironmentHandle, ProvisionError};
    use toolhost_types::ToolManifest;

    struct NoopProvisioner;

    #[async_trait]
    impl Provisioner for NoopProvisioner {
        async fn ensure(
            &self,
            manifest: &ToolManifest,
        ) -> Result<(EnvironmentHandle, bool), ProvisionError> {
            Ok((
                EnvironmentHandle {
                    env_dir: PathBuf::from("/envs").join(&manifest.name),
                    interpreter: PathBuf::from("/usr/bin/python3"),
                },
                true,
            ))
        }
    }

    fn write_manifest(dir: &std::path::Path, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join("tool.yaml"),
            format!(
                "name: {name}\nversion: \"1.0.0\"\nruntime:\n  language: python3.11\n  entrypoint: main.py\nrpc: {{}}\n"
            ),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn install_from_local_path_then_scan_finds_it() {
        let source_dir = tempfile::tempdir().unwrap();
        write_manifest(source_dir.path(), "calc");

        let tools_root = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new(tools_root.path(), Arc::new(NoopProvisioner));

        let summary = registry.install(source_dir.path().to_str().unwrap()).await.unwrap();
        assert_eq!(summary.name, "calc");
        assert_eq!(summary.status, ToolStatus::Stopped);

        let tool = registry.get("calc").await.unwrap();
        assert!(tool.environment.is_some());
    }

    #[tokio::test]
    async fn installing_twice_fails_with_already_installed() {
        let source_dir = tempfile::tempdir().unwrap();
        write_manifest(source_dir.path(), "calc");

        let tools_root = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new(tools_root.path(), Arc::new(NoopProvisioner));

        registry.install(source_dir.path().to_str().unwrap()).await.unwrap();
        let err = registry.install(source_dir.path().to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyInstalled { .. }));
    }

    #[tokio::test]
    async fn record_health_transitions_to_unhealthy_at_threshold() {
        let source_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(source_dir.path()).unwrap();
        std::fs::write(
            source_dir.path().join("tool.yaml"),
            "name: pinger\nversion: \"1.0.0\"\nruntime:\n  language: python3.11\n  entrypoint: main.py\nrpc: {}\nhealth:\n  method: ping\n  failure_threshold: 2\n",
        )
        .unwrap();

        let tools_root = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::new(tools_root.path(), Arc::new(NoopProvisioner));
        registry.install(source_dir.path().to_str().unwrap()).await.unwrap();

        let first = registry.record_health("pinger", false).await.unwrap();
        assert_eq!(first, HealthStatus::Unknown);
        let second = registry.record_health("pinger", false).await.unwrap();
        assert_eq!(second, HealthStatus::Unhealthy);

        let recovered = registry.record_health("pinger", true).await.unwrap();
        assert_eq!(recovered, HealthStatus::Healthy);
    }
}
