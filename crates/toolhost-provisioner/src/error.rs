use thiserror::Error;

/// Errors raised while ensuring or populating a tool's environment.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Creating the environment's interpreter (e.g. `python3 -m venv`)
    /// failed.
    #[error("failed to create environment for '{tool}': {reason}")]
    CreationFailed {
        /// Tool name the environment belongs to.
        tool: String,
        /// Captured stderr or process error.
        reason: String,
    },

    /// A dependency install step exited non-zero.
    #[error("installing {stage} for '{tool}' failed: {reason}")]
    InstallFailed {
        /// Tool name being provisioned.
        tool: String,
        /// Which install stage failed: "system packages", "packages", or
        /// "requirements".
        stage: &'static str,
        /// Captured stderr or process error.
        reason: String,
    },

    /// An I/O error unrelated to the child process itself (e.g. creating
    /// the environment root directory).
    #[error("provisioner I/O error for '{tool}': {source}")]
    Io {
        /// Tool name being provisioned.
        tool: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}
