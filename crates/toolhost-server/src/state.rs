//! Shared application state handed to every route handler.

use std::sync::Arc;

use toolhost_broker::Broker;
use toolhost_executor::Executor;
use toolhost_filestore::{FileStore, OutputRefManager};
use toolhost_registry::ToolRegistry;

/// What this process does with the requests it receives (§4.5: "In broker
/// mode, the HTTP Server does not hold tools; it forwards tool requests
/// to a registered child").
#[derive(Clone)]
pub enum HostMode {
    /// Owns and executes tools directly.
    Standalone {
        /// The installed-tool catalogue.
        registry: Arc<ToolRegistry>,
        /// Process lifecycle and RPC dispatch.
        executor: Arc<Executor>,
    },
    /// Owns no tools; aggregates and proxies to registered children.
    Broker {
        /// The child registry and proxy.
        broker: Arc<Broker>,
    },
}

/// State shared by every axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Standalone or broker behavior for the tool routes.
    pub mode: HostMode,
    /// First-class file persistence; absent in broker mode (§4.7:
    /// "Store proxy" is out of scope).
    pub filestore: Option<Arc<FileStore>>,
    /// Legacy per-call output-ref manager; absent in broker mode.
    pub output_refs: Option<Arc<OutputRefManager>>,
    /// Bearer credential required on every request, if configured (§4.5).
    pub auth_token: Option<String>,
    /// URL prefix wrapped output refs are served under (e.g. `/v1/files`).
    pub outputs_url_base: String,
    /// Directory multipart uploads are spooled into.
    pub uploads_root: std::path::PathBuf,
}
