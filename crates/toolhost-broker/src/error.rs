//! Error taxonomy for the broker (§4.7).

use thiserror::Error;

/// Failure modes surfaced by [`crate::Broker`].
#[derive(Debug, Error)]
pub enum BrokerError {
    /// `heartbeat` was called with an id that never registered.
    #[error("unknown child: {id}")]
    UnknownChild {
        /// The id the child sent.
        id: String,
    },

    /// No child currently claims the requested tool, or its owner is not
    /// healthy (§4.7: "Proxy": "503 if none or owner unhealthy").
    #[error("no healthy owner for tool {tool}")]
    NoHealthyOwner {
        /// The tool name that was requested.
        tool: String,
    },

    /// The outbound request to the child failed at the transport level.
    #[error("upstream request to child {child} failed: {reason}")]
    Upstream {
        /// The child that was being proxied to.
        child: String,
        /// Description of the transport failure.
        reason: String,
    },

    /// The store proxy is not implemented (§4.7: "Store proxy").
    #[error("store proxying is not implemented")]
    StoreProxyNotImplemented,
}
