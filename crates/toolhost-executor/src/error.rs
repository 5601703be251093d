use thiserror::Error;
use toolhost_provisioner::ProvisionError;

/// Errors raised by the executor while dispatching or supervising a call
/// (§4.4.6, §7).
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// No tool with the given name is registered.
    #[error("tool '{name}' not found")]
    ToolNotFound {
        /// Tool name that was looked up.
        name: String,
    },

    /// The tool's manifest declares no method of that name.
    #[error("tool '{tool}' has no method '{method}'")]
    MethodNotFound {
        /// Tool being called.
        tool: String,
        /// Method name that was not found.
        method: String,
    },

    /// `Start`/`Stop` invoked against a tool whose mode does not support it.
    #[error("tool '{tool}' is '{mode}' and does not support this operation")]
    WrongMode {
        /// Tool the operation was attempted against.
        tool: String,
        /// The tool's actual mode, for display.
        mode: &'static str,
    },

    /// A persistent-mode call was made before `Start`, or after the shared
    /// child was reaped following a fatal transport error.
    #[error("tool '{tool}' is not running")]
    NotRunning {
        /// Tool that was called.
        tool: String,
    },

    /// The child never reached a callable bootstrap state within its
    /// startup timeout.
    #[error("tool '{tool}' failed to start: {reason}")]
    StartupFailed {
        /// Tool that failed to start.
        tool: String,
        /// Captured reason (stderr, probe failure, timeout).
        reason: String,
    },

    /// A framed-transport call exceeded its per-call timeout.
    #[error("call to '{tool}' timed out")]
    Timeout {
        /// Tool that timed out.
        tool: String,
    },

    /// The channel to the child closed or errored mid-call.
    #[error("transport error calling '{tool}': {reason}")]
    Transport {
        /// Tool being called.
        tool: String,
        /// Description of the transport failure.
        reason: String,
    },

    /// The child returned `ok: false`.
    #[error("tool '{tool}' returned an error ({kind}): {message}")]
    ToolError {
        /// Tool that raised the error.
        tool: String,
        /// The child-supplied error type tag.
        kind: String,
        /// The child-supplied error message.
        message: String,
    },

    /// Environment provisioning failed while preparing a call.
    #[error("provisioning error: {0}")]
    Provision(#[from] ProvisionError),

    /// The tool was not found in the registry (propagated from a registry
    /// lookup that raced with removal).
    #[error("registry error: {0}")]
    Registry(#[from] toolhost_registry::RegistryError),
}
