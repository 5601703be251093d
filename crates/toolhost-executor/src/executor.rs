//! The executor: process-lifecycle state machine plus RPC dispatch
//! (§4.4).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use toolhost_registry::{RegistryError, ToolRegistry, ToolStatus};
use toolhost_types::{Mode, Transport};
use tracing::{info, instrument, warn};

use crate::error::ExecutorError;
use crate::supervisor::{supervise, SupervisedChild};
use crate::transport::{EvalChild, FramedChild};

/// Owns the two process tables and the health-supervisor cancellation
/// tokens (§4.4: "It holds two tables keyed by tool name and a table of
/// cancellation tokens for health supervisors").
pub struct Executor {
    eval_table: DashMap<String, Arc<Mutex<EvalChild>>>,
    framed_table: DashMap<String, Arc<Mutex<FramedChild>>>,
    health_tokens: DashMap<String, CancellationToken>,
    registry: Arc<ToolRegistry>,
}

impl Executor {
    /// An executor with empty tables, backed by `registry`.
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            eval_table: DashMap::new(),
            framed_table: DashMap::new(),
            health_tokens: DashMap::new(),
            registry,
        }
    }

    async fn ensure_environment(&self, tool: &str) -> Result<toolhost_provisioner::EnvironmentHandle, ExecutorError> {
        self.registry.ensure_environment(tool).await.map_err(|err| match err {
            RegistryError::Provision(provision_err) => ExecutorError::Provision(provision_err),
            other => ExecutorError::Registry(other),
        })
    }

    /// Dispatch `{tool, method, params}` per the (mode, transport) matrix
    /// in §4.4.4.
    #[instrument(skip(self, params), fields(tool = %tool_name, method = %method))]
    pub async fn call(&self, tool_name: &str, method: &str, params: Value) -> Result<Value, ExecutorError> {
        let tool = self
            .registry
            .get(tool_name)
            .await
            .ok_or_else(|| ExecutorError::ToolNotFound { name: tool_name.to_string() })?;

        if !tool.manifest.rpc.contains_key(method) {
            return Err(ExecutorError::MethodNotFound { tool: tool_name.to_string(), method: method.to_string() });
        }

        let environment = self.ensure_environment(tool_name).await?;
        let entrypoint = tool.location.join(&tool.manifest.runtime.entrypoint);
        let startup_timeout = Duration::from_secs(tool.manifest.runtime.startup_timeout_secs);

        match (tool.manifest.runtime.mode, tool.manifest.runtime.transport) {
            (Mode::Oneshot, Transport::Eval) => {
                let mut child =
                    EvalChild::spawn_and_bootstrap(tool_name, &environment.interpreter, &entrypoint, startup_timeout).await?;
                let result = child.invoke(method, params).await;
                child.close().await;
                result
            }
            (Mode::Oneshot, Transport::Framed) => {
                let mut child = FramedChild::spawn(tool_name, &environment.interpreter, &entrypoint).await?;
                let result = child.invoke(method, params).await;
                child.close().await;
                result
            }
            (Mode::Persistent, Transport::Eval) => {
                let entry = self
                    .eval_table
                    .get(tool_name)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| ExecutorError::NotRunning { tool: tool_name.to_string() })?;
                let result = entry.lock().await.invoke(method, params).await;
                if matches!(result, Err(ExecutorError::Transport { .. })) {
                    self.purge_dead(tool_name).await;
                }
                result
            }
            (Mode::Persistent, Transport::Framed) => {
                let entry = self
                    .framed_table
                    .get(tool_name)
                    .map(|entry| entry.value().clone())
                    .ok_or_else(|| ExecutorError::NotRunning { tool: tool_name.to_string() })?;
                let result = entry.lock().await.invoke(method, params).await;
                if matches!(result, Err(ExecutorError::Transport { .. })) {
                    self.purge_dead(tool_name).await;
                }
                result
            }
        }
    }

    /// Drop a persistent tool's handle after its transport reports a fatal
    /// error: cancel the health supervisor, remove the table entry, and
    /// mark the tool stopped (§4.4.6, §7: "the handle is dropped from the
    /// table and the next call returns `NotRunning`").
    async fn purge_dead(&self, tool_name: &str) {
        if let Some((_, token)) = self.health_tokens.remove(tool_name) {
            token.cancel();
        }
        self.eval_table.remove(tool_name);
        self.framed_table.remove(tool_name);
        warn!(tool = %tool_name, "transport failed fatally, dropping handle");
        let _ = self.registry.set_status(tool_name, ToolStatus::Stopped).await;
    }

    /// Start a persistent tool's shared child, and its health supervisor
    /// if a health block is configured. Idempotent: starting an
    /// already-started tool is a no-op.
    #[instrument(skip(self), fields(tool = %tool_name))]
    pub async fn start(&self, tool_name: &str) -> Result<(), ExecutorError> {
        let tool = self
            .registry
            .get(tool_name)
            .await
            .ok_or_else(|| ExecutorError::ToolNotFound { name: tool_name.to_string() })?;

        if tool.manifest.runtime.mode != Mode::Persistent {
            return Err(ExecutorError::WrongMode { tool: tool_name.to_string(), mode: "oneshot" });
        }

        if self.eval_table.contains_key(tool_name) || self.framed_table.contains_key(tool_name) {
            return Ok(());
        }

        let environment = self.ensure_environment(tool_name).await?;
        let entrypoint = tool.location.join(&tool.manifest.runtime.entrypoint);
        let startup_timeout = Duration::from_secs(tool.manifest.runtime.startup_timeout_secs);

        let supervised = match tool.manifest.runtime.transport {
            Transport::Eval => {
                let child =
                    EvalChild::spawn_and_bootstrap(tool_name, &environment.interpreter, &entrypoint, startup_timeout).await?;
                let child = Arc::new(Mutex::new(child));
                self.eval_table.insert(tool_name.to_string(), child.clone());
                SupervisedChild::Eval(child)
            }
            Transport::Framed => {
                let child = FramedChild::spawn(tool_name, &environment.interpreter, &entrypoint).await?;
                let child = Arc::new(Mutex::new(child));
                self.framed_table.insert(tool_name.to_string(), child.clone());
                SupervisedChild::Framed(child)
            }
        };

        self.registry.set_status(tool_name, ToolStatus::Running).await?;
        info!(tool = %tool_name, "started");

        if let Some(health) = tool.manifest.health.clone() {
            let token = CancellationToken::new();
            self.health_tokens.insert(tool_name.to_string(), token.clone());
            tokio::spawn(supervise(tool_name.to_string(), supervised, health, self.registry.clone(), token));
        }

        Ok(())
    }

    /// Stop a persistent tool: cancel its health supervisor, tear down
    /// the shared child, and mark it stopped. Idempotent.
    #[instrument(skip(self), fields(tool = %tool_name))]
    pub async fn stop(&self, tool_name: &str) -> Result<(), ExecutorError> {
        if let Some((_, token)) = self.health_tokens.remove(tool_name) {
            token.cancel();
        }
        if let Some((_, child)) = self.eval_table.remove(tool_name) {
            child.lock().await.close().await;
        }
        if let Some((_, child)) = self.framed_table.remove(tool_name) {
            child.lock().await.close().await;
        }

        self.registry.set_status(tool_name, ToolStatus::Stopped).await?;
        info!(tool = %tool_name, "stopped");
        Ok(())
    }

    /// Tear down every started tool. Used on host shutdown.
    pub async fn close(&self) {
        let running: Vec<String> = self
            .eval_table
            .iter()
            .map(|entry| entry.key().clone())
            .chain(self.framed_table.iter().map(|entry| entry.key().clone()))
            .collect();
        for tool_name in running {
            let _ = self.stop(&tool_name).await;
        }
    }
}
