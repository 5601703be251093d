use std::path::PathBuf;

use thiserror::Error;
use toolhost_provisioner::ProvisionError;
use toolhost_types::ManifestError;

/// Errors raised by registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A tool of the same name is already installed.
    #[error("tool '{name}' is already installed")]
    AlreadyInstalled {
        /// Name of the conflicting tool.
        name: String,
    },

    /// No tool with the given name is registered.
    #[error("tool '{name}' not found")]
    NotFound {
        /// Name that was looked up.
        name: String,
    },

    /// The manifest at the installed location failed to parse.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Provisioning the tool's environment failed.
    #[error("provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    /// Fetching a remote source failed.
    #[error("failed to fetch remote source '{source}': {reason}")]
    FetchFailed {
        /// The source URL that failed.
        source: String,
        /// Captured stderr or process error.
        reason: String,
    },

    /// An I/O error occurred while materialising or scanning a tool
    /// directory.
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path the operation was acting on.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}
