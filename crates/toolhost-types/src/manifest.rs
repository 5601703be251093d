//! Tool manifest – the declarative record installed alongside a tool's
//! entrypoint program (§3, §4.1).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::schema::MethodDescriptor;

/// Name of the manifest file the registry looks for inside a tool
/// directory.
pub const MANIFEST_FILENAME: &str = "tool.yaml";

fn default_mode() -> Mode {
    Mode::Oneshot
}

fn default_transport() -> Transport {
    Transport::Eval
}

fn default_entrypoint() -> String {
    "main.py".to_string()
}

fn default_startup_timeout() -> u64 {
    60
}

fn default_health_interval() -> u64 {
    30
}

fn default_health_threshold() -> u32 {
    3
}

/// Execution mode: a fresh child per call, or one shared long-lived child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Every call spawns a fresh child, completes, tears down.
    Oneshot,
    /// A single shared child is created by `Start` and reused until `Stop`.
    Persistent,
}

/// RPC transport: the line-oriented evaluation channel, or the framed
/// binary message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Line-oriented read-eval-print channel over the child's stdio.
    Eval,
    /// Length-prefixed binary message channel.
    Framed,
}

/// Runtime block of the manifest: how to spawn and talk to the tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSpec {
    /// Declared language/version, e.g. `"python3.11"`. Informational for
    /// most provisioners, but selects which `Provisioner` implementation
    /// handles this tool.
    pub language: String,

    /// Language-level packages to install when the environment is fresh.
    #[serde(default)]
    pub packages: Vec<String>,

    /// Path (relative to the tool directory) to a requirements file,
    /// installed after `packages` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,

    /// System-level packages installed one at a time before `packages`.
    #[serde(default)]
    pub system_packages: Vec<String>,

    /// oneshot or persistent (§3 defaults: `oneshot`).
    #[serde(default = "default_mode")]
    pub mode: Mode,

    /// eval or framed (§3 defaults: `eval`).
    #[serde(default = "default_transport")]
    pub transport: Transport,

    /// Entrypoint path relative to the tool directory.
    #[serde(default = "default_entrypoint")]
    pub entrypoint: String,

    /// Seconds allowed for the child to reach a callable bootstrap before
    /// `StartupFailed` is raised.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
}

/// Health block: which method to poll, how often, and the failure
/// threshold before a tool is marked unhealthy (§4.4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSpec {
    /// Method name invoked with empty params on each tick.
    pub method: String,

    /// Seconds between ticks (§3 default: 30).
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,

    /// Consecutive unhealthy responses before the tool is marked
    /// `unhealthy` (§3 default: 3).
    #[serde(default = "default_health_threshold")]
    pub failure_threshold: u32,
}

/// Top-level manifest document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolManifest {
    /// Unique tool identifier.
    pub name: String,
    /// Tool semantic version.
    pub version: String,
    /// Short human description.
    #[serde(default)]
    pub description: String,
    /// Free-form capability strings.
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Runtime/process block.
    pub runtime: RuntimeSpec,

    /// Resource hints — informational only, never enforced by the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<serde_json::Value>,

    /// Method name -> descriptor.
    pub rpc: BTreeMap<String, MethodDescriptor>,

    /// Optional health policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthSpec>,
}

impl ToolManifest {
    /// Parse a manifest document, trying YAML first and falling back to
    /// JSON (§3: "manifest document is parsed as YAML by default ... JSON
    /// also accepted").
    pub fn parse(raw: &str, source: &Path) -> Result<Self, ManifestError> {
        match serde_yaml::from_str::<ToolManifest>(raw) {
            Ok(manifest) => {
                manifest.validate()?;
                Ok(manifest)
            }
            Err(yaml_err) => match serde_json::from_str::<ToolManifest>(raw) {
                Ok(manifest) => {
                    manifest.validate()?;
                    Ok(manifest)
                }
                Err(_json_err) => Err(ManifestError::Parse {
                    path: source.display().to_string(),
                    reason: yaml_err.to_string(),
                }),
            },
        }
    }

    fn validate(&self) -> Result<(), ManifestError> {
        if self.name.trim().is_empty() {
            return Err(ManifestError::MissingField { field: "name".into() });
        }
        if self.version.trim().is_empty() {
            return Err(ManifestError::MissingField { field: "version".into() });
        }
        if self.runtime.entrypoint.trim().is_empty() {
            return Err(ManifestError::MissingField {
                field: "runtime.entrypoint".into(),
            });
        }
        Ok(())
    }

    /// Ordered list of RPC method names, as surfaced by the registry's
    /// info/summary view (§4.2).
    pub fn method_names(&self) -> Vec<String> {
        self.rpc.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sample_yaml() -> &'static str {
        r#"
name: calc
version: "1.0.0"
description: arithmetic demo tool
capabilities: [math]
runtime:
  language: python3.11
  entrypoint: main.py
rpc:
  add:
    description: add two numbers
    input_schema: { type: object }
    output_schema: { type: integer }
"#
    }

    #[test]
    fn parses_yaml_and_applies_defaults() {
        let manifest = ToolManifest::parse(sample_yaml(), &PathBuf::from("tool.yaml")).unwrap();
        assert_eq!(manifest.name, "calc");
        assert_eq!(manifest.runtime.mode, Mode::Oneshot);
        assert_eq!(manifest.runtime.transport, Transport::Eval);
        assert_eq!(manifest.runtime.startup_timeout_secs, 60);
        assert!(manifest.health.is_none());
        assert_eq!(manifest.method_names(), vec!["add".to_string()]);
    }

    #[test]
    fn parses_equivalent_json() {
        let as_yaml = ToolManifest::parse(sample_yaml(), &PathBuf::from("tool.yaml")).unwrap();
        let as_json = serde_json::to_string(&as_yaml).unwrap();
        let reparsed = ToolManifest::parse(&as_json, &PathBuf::from("tool.json")).unwrap();
        assert_eq!(reparsed.name, as_yaml.name);
    }

    #[test]
    fn rejects_missing_name() {
        let bad = "name: \"\"\nversion: \"1\"\nruntime: { language: python }\nrpc: {}\n";
        let err = ToolManifest::parse(bad, &PathBuf::from("tool.yaml")).unwrap_err();
        assert!(matches!(err, ManifestError::MissingField { .. }));
    }

    #[test]
    fn health_defaults_apply() {
        let raw = r#"
name: m
version: "1"
runtime: { language: python3.11, mode: persistent, transport: framed }
rpc: {}
health:
  method: h
"#;
        let manifest = ToolManifest::parse(raw, &PathBuf::from("tool.yaml")).unwrap();
        let health = manifest.health.unwrap();
        assert_eq!(health.interval_secs, 30);
        assert_eq!(health.failure_threshold, 3);
        assert_eq!(manifest.runtime.mode, Mode::Persistent);
        assert_eq!(manifest.runtime.transport, Transport::Framed);
    }
}
