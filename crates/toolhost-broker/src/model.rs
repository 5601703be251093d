//! The child server record (§3: "Child server (broker)").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status of a registered child, as tracked by [`crate::Broker`]'s
/// cleanup sweep (§4.7: "Cleanup").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildStatus {
    /// Heartbeat received within the timeout window.
    Healthy,
    /// Heartbeat overdue by more than one timeout.
    Unhealthy,
}

/// One host registered with the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildServer {
    /// Identity the child chose at registration.
    pub id: String,
    /// Base URL the broker forwards requests to.
    pub url: String,
    /// Human-readable name, surfaced in aggregated tool listings.
    pub name: String,
    /// Tool names this child currently claims to host.
    pub tools: Vec<String>,
    /// When this child first registered.
    pub registered_at: DateTime<Utc>,
    /// When this child last sent a heartbeat.
    pub last_heartbeat: DateTime<Utc>,
    /// Current health status.
    pub status: ChildStatus,
}
