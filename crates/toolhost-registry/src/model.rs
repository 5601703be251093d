use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use toolhost_provisioner::EnvironmentHandle;
use toolhost_types::{Mode, ToolManifest};

/// Lifecycle status of a tool as tracked by the registry (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// No process is associated with this tool right now.
    Stopped,
    /// A process (oneshot in flight, or the persistent child) is running.
    Running,
}

/// Health status as reported by the executor's health supervisor (§4.4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No health check has completed yet.
    Unknown,
    /// The most recent health checks have succeeded.
    Healthy,
    /// Consecutive health check failures reached the configured threshold.
    Unhealthy,
}

/// A tool known to the registry: identity, location, manifest, and the
/// mutable state tracked alongside it (§3).
#[derive(Debug, Clone)]
pub struct Tool {
    /// Unique name, taken from the manifest.
    pub name: String,
    /// Directory this tool's manifest and entrypoint live in.
    pub location: PathBuf,
    /// Parsed manifest.
    pub manifest: ToolManifest,
    /// Provisioned environment, once `Ensure` has run at least once.
    pub environment: Option<EnvironmentHandle>,
    /// Current lifecycle status.
    pub status: ToolStatus,
    /// Current health status, if a health block is configured.
    pub health_status: Option<HealthStatus>,
    /// Consecutive health-check failures observed so far.
    pub consecutive_failures: u32,
}

impl Tool {
    /// A freshly-scanned or freshly-installed tool: stopped, with health
    /// status `unknown` if (and only if) a health block is configured.
    pub fn new(name: String, location: PathBuf, manifest: ToolManifest) -> Self {
        let health_status = manifest.health.as_ref().map(|_| HealthStatus::Unknown);
        Self {
            name,
            location,
            manifest,
            environment: None,
            status: ToolStatus::Stopped,
            health_status,
            consecutive_failures: 0,
        }
    }

    /// Build the read-only summary view exposed over HTTP (§4.2).
    pub fn summary(&self) -> ToolSummary {
        ToolSummary {
            name: self.name.clone(),
            version: self.manifest.version.clone(),
            description: self.manifest.description.clone(),
            capabilities: self.manifest.capabilities.clone(),
            mode: self.manifest.runtime.mode,
            status: self.status,
            health_status: self.health_status,
            methods: self.manifest.method_names(),
        }
    }
}

/// Summary view of a tool, as surfaced by `GET /v1/tools` and
/// `GET /v1/tools/{name}` (§4.2, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSummary {
    /// Tool name.
    pub name: String,
    /// Tool version.
    pub version: String,
    /// Human description.
    pub description: String,
    /// Declared capability strings.
    pub capabilities: Vec<String>,
    /// oneshot or persistent.
    pub mode: Mode,
    /// Current lifecycle status.
    pub status: ToolStatus,
    /// Current health status, if configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_status: Option<HealthStatus>,
    /// RPC method names this tool exposes. The registry surfaces these
    /// without evaluating their schemas.
    pub methods: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use toolhost_types::{RuntimeSpec, Transport};

    fn manifest(health: bool) -> ToolManifest {
        ToolManifest {
            name: "calc".to_string(),
            version: "1.0.0".to_string(),
            description: "arithmetic demo".to_string(),
            capabilities: vec!["math".to_string()],
            runtime: RuntimeSpec {
                language: "python3.11".to_string(),
                packages: vec![],
                requirements: None,
                system_packages: vec![],
                mode: Mode::Oneshot,
                transport: Transport::Eval,
                entrypoint: "main.py".to_string(),
                startup_timeout_secs: 60,
            },
            resources: None,
            rpc: BTreeMap::new(),
            health: health.then(|| toolhost_types::HealthSpec {
                method: "ping".to_string(),
                interval_secs: 30,
                failure_threshold: 3,
            }),
        }
    }

    #[test]
    fn new_tool_has_unknown_health_only_when_health_block_present() {
        let with_health = Tool::new("calc".into(), PathBuf::from("/tools/calc"), manifest(true));
        assert_eq!(with_health.health_status, Some(HealthStatus::Unknown));

        let without_health = Tool::new("calc".into(), PathBuf::from("/tools/calc"), manifest(false));
        assert_eq!(without_health.health_status, None);
    }

    #[test]
    fn summary_surfaces_method_names_without_schemas() {
        let tool = Tool::new("calc".into(), PathBuf::from("/tools/calc"), manifest(false));
        let summary = tool.summary();
        assert_eq!(summary.name, "calc");
        assert_eq!(summary.status, ToolStatus::Stopped);
        assert!(summary.methods.is_empty());
    }
}
