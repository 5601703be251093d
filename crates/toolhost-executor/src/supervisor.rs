//! Health supervisor: one task per started tool that declares a health
//! block (§4.4.5).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use toolhost_registry::ToolRegistry;
use toolhost_types::HealthSpec;
use tracing::{debug, instrument};

use crate::transport::{EvalChild, FramedChild};

/// The child a supervisor ticks against, abstracting over which table it
/// came from.
pub enum SupervisedChild {
    /// Eval-transport child, shared with user calls via the same lock
    /// (§5: "health checks ... are serialised against user calls by the
    /// same transport lock").
    Eval(Arc<Mutex<EvalChild>>),
    /// Framed-transport child, likewise shared.
    Framed(Arc<Mutex<FramedChild>>),
}

impl SupervisedChild {
    async fn check(&self, method: &str) -> bool {
        let result = match self {
            SupervisedChild::Eval(child) => child.lock().await.invoke(method, Value::Object(Default::default())).await,
            SupervisedChild::Framed(child) => child.lock().await.invoke(method, Value::Object(Default::default())).await,
        };
        match result {
            Ok(value) => is_healthy(&value),
            Err(_) => false,
        }
    }
}

/// A response is "healthy" iff it is an object with `status == "ok"`, or
/// the literal string `"ok"` (§4.4.5).
fn is_healthy(value: &Value) -> bool {
    match value {
        Value::String(s) => s == "ok",
        Value::Object(map) => map.get("status").and_then(Value::as_str) == Some("ok"),
        _ => false,
    }
}

/// Run the health loop for `tool` until `token` is cancelled: sleep 2s,
/// then tick at `spec.interval_secs`, recording each outcome in the
/// registry (§4.4.5).
#[instrument(skip(child, registry, token), fields(tool = %tool))]
pub async fn supervise(
    tool: String,
    child: SupervisedChild,
    spec: HealthSpec,
    registry: Arc<ToolRegistry>,
    token: CancellationToken,
) {
    tokio::select! {
        _ = token.cancelled() => return,
        _ = tokio::time::sleep(Duration::from_secs(2)) => {}
    }

    let mut interval = tokio::time::interval(Duration::from_secs(spec.interval_secs.max(1)));
    interval.tick().await; // interval fires immediately once; consume it, we already slept.

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!(tool = %tool, "health supervisor cancelled");
                return;
            }
            _ = interval.tick() => {
                let healthy = child.check(&spec.method).await;
                if let Err(err) = registry.record_health(&tool, healthy).await {
                    debug!(tool = %tool, error = %err, "failed to record health outcome, tool likely removed");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_object_and_literal_are_recognized() {
        assert!(is_healthy(&serde_json::json!("ok")));
        assert!(is_healthy(&serde_json::json!({"status": "ok"})));
        assert!(!is_healthy(&serde_json::json!({"status": "degraded"})));
        assert!(!is_healthy(&serde_json::json!(42)));
    }
}
