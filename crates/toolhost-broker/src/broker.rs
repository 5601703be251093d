//! The broker: aggregates child hosts behind registration, heartbeat, and
//! proxying (§4.7).

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::BrokerError;
use crate::model::{ChildServer, ChildStatus};

const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);
const DEAD_AFTER: Duration = Duration::from_secs(HEARTBEAT_TIMEOUT.as_secs() * 3);
const LIST_TOOLS_TIMEOUT: Duration = Duration::from_secs(30);
/// Long enough to cover model-load methods (§5: "Cancellation and timeouts").
const PROXY_TIMEOUT: Duration = Duration::from_secs(300);

/// The forwarded response from a proxied call: status, headers, and body
/// streamed back unchanged (§4.7: "Proxy").
pub struct ProxyResponse {
    /// Upstream status code.
    pub status: u16,
    /// Upstream response headers, in arrival order.
    pub headers: Vec<(String, String)>,
    /// Upstream response body.
    pub body: Bytes,
}

/// A host that owns no tools and instead aggregates child hosts (§4.7).
///
/// One lock guards the children map and reverse index (§5); both are
/// `DashMap`s here, so individual entries lock independently rather than
/// sharing one coarse lock, matching the teacher's progress-monitor idiom.
pub struct Broker {
    children: DashMap<String, ChildServer>,
    tool_index: DashMap<String, String>,
    http: reqwest::Client,
}

impl Broker {
    /// A broker with no registered children.
    pub fn new() -> Self {
        Self { children: DashMap::new(), tool_index: DashMap::new(), http: reqwest::Client::new() }
    }

    /// Register a child, replacing any prior registration under the same
    /// id, and claim each of its tools in the reverse index. Returns the
    /// heartbeat interval in seconds the child should use (§4.7:
    /// "Register").
    #[instrument(skip(self, url, name))]
    pub fn register(&self, id: &str, url: &str, name: &str, tools: Vec<String>) -> u64 {
        let now = Utc::now();
        for tool in &tools {
            self.tool_index.insert(tool.clone(), id.to_string());
        }
        self.children.insert(
            id.to_string(),
            ChildServer {
                id: id.to_string(),
                url: url.to_string(),
                name: name.to_string(),
                tools,
                registered_at: now,
                last_heartbeat: now,
                status: ChildStatus::Healthy,
            },
        );
        info!(child = %id, "registered");
        HEARTBEAT_TIMEOUT.as_secs() / 2
    }

    /// Refresh a child's heartbeat, optionally replacing its claimed
    /// tool list (§4.7: "Heartbeat").
    pub fn heartbeat(&self, id: &str, tools: Option<Vec<String>>) -> Result<(), BrokerError> {
        let mut child = self.children.get_mut(id).ok_or_else(|| BrokerError::UnknownChild { id: id.to_string() })?;
        child.last_heartbeat = Utc::now();
        child.status = ChildStatus::Healthy;

        if let Some(tools) = tools {
            for old_tool in &child.tools {
                let still_owned = self.tool_index.get(old_tool).map(|owner| owner.value() == id).unwrap_or(false);
                if still_owned && !tools.contains(old_tool) {
                    self.tool_index.remove(old_tool);
                }
            }
            for tool in &tools {
                self.tool_index.insert(tool.clone(), id.to_string());
            }
            child.tools = tools;
        }
        Ok(())
    }

    /// Current snapshot of a registered child.
    pub fn get(&self, id: &str) -> Option<ChildServer> {
        self.children.get(id).map(|entry| entry.clone())
    }

    /// Every registered child, healthy or not.
    pub fn list_children(&self) -> Vec<ChildServer> {
        self.children.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Fetch `/v1/tools` from every healthy child, tagging each entry with
    /// `server_id`/`server_name`; a per-child failure is logged and
    /// skipped, never aborting the whole aggregation (§4.7: "List tools").
    #[instrument(skip(self))]
    pub async fn list_tools(&self) -> Vec<Value> {
        let healthy: Vec<ChildServer> =
            self.children.iter().filter(|entry| entry.status == ChildStatus::Healthy).map(|entry| entry.clone()).collect();

        let mut aggregated = Vec::new();
        for child in healthy {
            let url = format!("{}/v1/tools", child.url.trim_end_matches('/'));
            let response = match self.http.get(&url).timeout(LIST_TOOLS_TIMEOUT).send().await {
                Ok(response) => response,
                Err(err) => {
                    warn!(child = %child.id, error = %err, "failed to list tools from child");
                    continue;
                }
            };
            let tools: Vec<Value> = match response.json().await {
                Ok(tools) => tools,
                Err(err) => {
                    warn!(child = %child.id, error = %err, "failed to parse tool list from child");
                    continue;
                }
            };
            for mut tool in tools {
                if let Value::Object(map) = &mut tool {
                    map.insert("server_id".to_string(), Value::String(child.id.clone()));
                    map.insert("server_name".to_string(), Value::String(child.name.clone()));
                }
                aggregated.push(tool);
            }
        }
        aggregated
    }

    fn resolve_owner(&self, tool: &str) -> Result<ChildServer, BrokerError> {
        let owner_id =
            self.tool_index.get(tool).map(|entry| entry.value().clone()).ok_or_else(|| BrokerError::NoHealthyOwner { tool: tool.to_string() })?;
        let child = self.children.get(&owner_id).map(|entry| entry.clone()).ok_or_else(|| BrokerError::NoHealthyOwner { tool: tool.to_string() })?;
        if child.status != ChildStatus::Healthy {
            return Err(BrokerError::NoHealthyOwner { tool: tool.to_string() });
        }
        Ok(child)
    }

    /// Forward a `/v1/tools/{name}/...` request to its owning child,
    /// injecting `X-Forwarded-For` and `X-Broker-Request: true`
    /// (§4.7: "Proxy").
    #[instrument(skip(self, headers, body))]
    pub async fn proxy(
        &self,
        tool: &str,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: Vec<(String, String)>,
        body: Bytes,
        client_addr: &str,
    ) -> Result<ProxyResponse, BrokerError> {
        let owner = self.resolve_owner(tool)?;

        let mut url = format!("{}{}", owner.url.trim_end_matches('/'), path);
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }

        let mut request = self.http.request(method, &url).timeout(PROXY_TIMEOUT).body(body);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        request = request.header("X-Forwarded-For", client_addr).header("X-Broker-Request", "true");

        let response = request.send().await.map_err(|err| BrokerError::Upstream { child: owner.id.clone(), reason: err.to_string() })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_str().unwrap_or_default().to_string()))
            .collect();
        let body = response.bytes().await.map_err(|err| BrokerError::Upstream { child: owner.id.clone(), reason: err.to_string() })?;

        Ok(ProxyResponse { status, headers, body })
    }

    /// The store proxy is out of scope (§4.7: "Store proxy").
    pub fn store_proxy(&self) -> Result<(), BrokerError> {
        Err(BrokerError::StoreProxyNotImplemented)
    }

    /// Run the cleanup sweep on a 30s tick until `token` is cancelled:
    /// overdue children flip to unhealthy, long-dead ones are dropped
    /// along with their reverse-index entries (§4.7: "Cleanup").
    pub async fn run_cleanup(&self, token: CancellationToken) {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = interval.tick() => self.cleanup_once(),
            }
        }
    }

    fn cleanup_once(&self) {
        let now = Utc::now();
        let mut dead = Vec::new();

        for mut entry in self.children.iter_mut() {
            let elapsed = now.signed_duration_since(entry.last_heartbeat).to_std().unwrap_or(Duration::ZERO);
            if elapsed > DEAD_AFTER {
                dead.push(entry.id.clone());
            } else if elapsed > HEARTBEAT_TIMEOUT && entry.status == ChildStatus::Healthy {
                entry.status = ChildStatus::Unhealthy;
                debug!(child = %entry.id, "child marked unhealthy");
            }
        }

        for id in dead {
            if let Some((_, child)) = self.children.remove(&id) {
                for tool in child.tools {
                    let still_owned = self.tool_index.get(&tool).map(|owner| owner.value() == &id).unwrap_or(false);
                    if still_owned {
                        self.tool_index.remove(&tool);
                    }
                }
                info!(child = %id, "child removed after prolonged silence");
            }
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_claims_tools_in_reverse_index() {
        let broker = Broker::new();
        let interval = broker.register("child-a", "http://localhost:9001", "alpha", vec!["calc".to_string()]);
        assert_eq!(interval, HEARTBEAT_TIMEOUT.as_secs() / 2);
        assert!(broker.resolve_owner("calc").is_ok());
    }

    #[test]
    fn heartbeat_on_unknown_child_fails() {
        let broker = Broker::new();
        let err = broker.heartbeat("ghost", None).unwrap_err();
        assert!(matches!(err, BrokerError::UnknownChild { .. }));
    }

    #[test]
    fn heartbeat_can_replace_claimed_tools() {
        let broker = Broker::new();
        broker.register("child-a", "http://localhost:9001", "alpha", vec!["calc".to_string()]);
        broker.heartbeat("child-a", Some(vec!["translate".to_string()])).unwrap();

        assert!(broker.resolve_owner("calc").is_err());
        assert!(broker.resolve_owner("translate").is_ok());
    }

    #[test]
    fn resolve_owner_fails_when_no_child_claims_the_tool() {
        let broker = Broker::new();
        let err = broker.resolve_owner("ghost-tool").unwrap_err();
        assert!(matches!(err, BrokerError::NoHealthyOwner { .. }));
    }

    #[test]
    fn cleanup_marks_overdue_children_unhealthy_then_removes_them() {
        let broker = Broker::new();
        broker.register("child-a", "http://localhost:9001", "alpha", vec!["calc".to_string()]);

        {
            let mut child = broker.children.get_mut("child-a").unwrap();
            child.last_heartbeat = Utc::now() - chrono::Duration::seconds(61);
        }
        broker.cleanup_once();
        assert_eq!(broker.get("child-a").unwrap().status, ChildStatus::Unhealthy);

        {
            let mut child = broker.children.get_mut("child-a").unwrap();
            child.last_heartbeat = Utc::now() - chrono::Duration::seconds(181);
        }
        broker.cleanup_once();
        assert!(broker.get("child-a").is_none());
        assert!(broker.resolve_owner("calc").is_err());
    }

    #[test]
    fn store_proxy_is_not_implemented() {
        let broker = Broker::new();
        assert!(matches!(broker.store_proxy().unwrap_err(), BrokerError::StoreProxyNotImplemented));
    }
}
