#![forbid(unsafe_code)]
//! Environment provisioning: the `Ensure(manifest) -> (handle, fresh)`
//! contract (§4.3).
//!
//! The provisioner is deliberately a thin, delegated collaborator — it
//! shells out to whatever language toolchain the manifest names rather
//! than reimplementing package management. Callers depend only on the
//! `Provisioner` trait, never on a concrete implementation.

mod error;
mod venv;

pub use error::ProvisionError;
pub use venv::VenvProvisioner;

use std::path::PathBuf;

use async_trait::async_trait;
use toolhost_types::ToolManifest;

/// Opaque handle to a provisioned, on-disk runtime environment for a tool.
///
/// Nothing outside this crate inspects the handle's fields; it is passed
/// back into the executor purely as an identifier of "where this tool's
/// interpreter and installed packages live".
#[derive(Debug, Clone)]
pub struct EnvironmentHandle {
    /// Root directory of the provisioned environment.
    pub env_dir: PathBuf,
    /// Absolute path of the interpreter to invoke the tool's entrypoint
    /// with.
    pub interpreter: PathBuf,
}

/// Ensures a tool has a usable runtime environment on disk, installing
/// dependencies the first time a given tool is provisioned.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Return the environment for `manifest`, creating and populating it
    /// if it does not already exist.
    ///
    /// The boolean is `true` exactly when this call created the
    /// environment (§4.3) — callers use it to decide whether dependency
    /// installation already happened on a prior call.
    async fn ensure(
        &self,
        manifest: &ToolManifest,
    ) -> Result<(EnvironmentHandle, bool), ProvisionError>;
}

/// Deterministic environment directory name for a tool, derived from its
/// manifest name (§4.3: "a deterministic name derived from the tool
/// name").
pub fn env_name(manifest: &ToolManifest) -> String {
    manifest
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
