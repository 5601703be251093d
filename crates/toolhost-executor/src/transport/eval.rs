//! Line-oriented eval transport: one JSON value per line over the child's
//! stdin/stdout (§4.4.2, §4.4.3).

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tracing::debug;

use crate::envelope::parse_eval_reply;
use crate::error::ExecutorError;

/// A running eval-transport child: bootstrapped once, then invoked
/// repeatedly for as long as the tool stays started (persistent mode) or
/// exactly once (oneshot mode).
pub struct EvalChild {
    tool: String,
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

impl EvalChild {
    /// Spawn `interpreter entrypoint` and run the three-step bootstrap
    /// handshake from §4.4.3, failing with `StartupFailed` if the child
    /// never reaches a callable state within `startup_timeout`.
    pub async fn spawn_and_bootstrap(
        tool: &str,
        interpreter: &Path,
        entrypoint: &Path,
        startup_timeout: Duration,
    ) -> Result<Self, ExecutorError> {
        let mut child = tokio::process::Command::new(interpreter)
            .arg(entrypoint)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ExecutorError::StartupFailed { tool: tool.to_string(), reason: err.to_string() })?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let lines = BufReader::new(stdout).lines();

        let mut eval_child = Self { tool: tool.to_string(), child, stdin, lines };

        tokio::time::timeout(startup_timeout, eval_child.bootstrap())
            .await
            .map_err(|_| ExecutorError::StartupFailed { tool: tool.to_string(), reason: "bootstrap timed out".to_string() })??;

        Ok(eval_child)
    }

    async fn bootstrap(&mut self) -> Result<(), ExecutorError> {
        // Step 1: activate the entrypoint's run-if-main guard and evaluate
        // the program. Step 2: lift the child's well-known names (call,
        // schema, methods, shutdown) into scope. Step 3: probe the call
        // entrypoint.
        for step in ["activate_entrypoint", "bind_namespace", "probe_call"] {
            self.send_line(&serde_json::json!({ "cmd": "bootstrap", "step": step }))
                .await?;
            let reply = self.read_line().await?;
            let ack: serde_json::Value = serde_json::from_str(reply.trim()).unwrap_or(serde_json::Value::Bool(false));
            let ok = ack.get("ok").and_then(Value::as_bool).unwrap_or(false);
            if !ok {
                return Err(ExecutorError::StartupFailed {
                    tool: self.tool.clone(),
                    reason: format!("bootstrap step '{step}' was not acknowledged"),
                });
            }
        }
        Ok(())
    }

    async fn send_line(&mut self, value: &Value) -> Result<(), ExecutorError> {
        let mut line = serde_json::to_string(value).map_err(|err| ExecutorError::Transport {
            tool: self.tool.clone(),
            reason: format!("failed to encode request: {err}"),
        })?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await.map_err(|err| ExecutorError::Transport {
            tool: self.tool.clone(),
            reason: format!("failed to write to child stdin: {err}"),
        })
    }

    async fn read_line(&mut self) -> Result<String, ExecutorError> {
        match self.lines.next_line().await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(ExecutorError::Transport { tool: self.tool.clone(), reason: "child closed stdout".to_string() }),
            Err(err) => Err(ExecutorError::Transport { tool: self.tool.clone(), reason: err.to_string() }),
        }
    }

    /// Invoke `method` with `params`, returning the envelope's `result`.
    pub async fn invoke(&mut self, method: &str, params: Value) -> Result<Value, ExecutorError> {
        self.send_line(&serde_json::json!({ "method": method, "params": params })).await?;
        let reply = self.read_line().await?;
        parse_eval_reply(&self.tool, &reply)
    }

    /// Best-effort shutdown: ask the child to exit cleanly, then reap it.
    pub async fn close(&mut self) {
        let _ = self.send_line(&serde_json::json!({ "cmd": "shutdown" })).await;
        debug!(tool = %self.tool, "tearing down eval child");
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}
