//! Framed transport: a 4-byte big-endian length prefix followed by a
//! MessagePack-encoded request or reply (§4.4.2, SPEC_FULL.md §4.4).

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tracing::debug;

use crate::envelope::{envelope_to_result, Envelope, EnvelopeError};
use crate::error::ExecutorError;

/// Per-call timeout for the framed transport (§4.4.2: "300 seconds").
pub const CALL_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Serialize)]
struct FramedRequest<'a> {
    method: &'a str,
    params: Value,
}

/// Wire twin of `Envelope`, owned (rmp-serde decodes into owned data).
#[derive(Deserialize)]
struct FramedReply {
    ok: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<FramedReplyError>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    chunk: Option<Value>,
}

#[derive(Deserialize)]
struct FramedReplyError {
    #[serde(rename = "type")]
    kind: String,
    message: String,
    #[serde(default)]
    traceback: Option<String>,
}

impl From<FramedReply> for Envelope {
    fn from(reply: FramedReply) -> Self {
        Envelope {
            ok: reply.ok,
            result: reply.result,
            error: reply.error.map(|e| EnvelopeError { kind: e.kind, message: e.message, traceback: e.traceback }),
            done: reply.done,
            chunk: reply.chunk,
        }
    }
}

/// A running framed-transport child.
pub struct FramedChild {
    tool: String,
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl FramedChild {
    /// Spawn `interpreter entrypoint`. Unlike the eval transport, framed
    /// startup has no handshake: the child registers its method handlers
    /// at start time (§4.4.3).
    pub async fn spawn(tool: &str, interpreter: &Path, entrypoint: &Path) -> Result<Self, ExecutorError> {
        let mut child = tokio::process::Command::new(interpreter)
            .arg(entrypoint)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| ExecutorError::StartupFailed { tool: tool.to_string(), reason: err.to_string() })?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        Ok(Self { tool: tool.to_string(), child, stdin, stdout })
    }

    async fn write_frame(&mut self, payload: &[u8]) -> Result<(), ExecutorError> {
        let len = u32::try_from(payload.len()).map_err(|_| ExecutorError::Transport {
            tool: self.tool.clone(),
            reason: "request frame too large".to_string(),
        })?;
        self.stdin.write_all(&len.to_be_bytes()).await.map_err(|err| ExecutorError::Transport {
            tool: self.tool.clone(),
            reason: format!("failed to write frame length: {err}"),
        })?;
        self.stdin.write_all(payload).await.map_err(|err| ExecutorError::Transport {
            tool: self.tool.clone(),
            reason: format!("failed to write frame body: {err}"),
        })
    }

    async fn read_frame(&mut self) -> Result<Vec<u8>, ExecutorError> {
        let mut len_buf = [0u8; 4];
        self.stdout.read_exact(&mut len_buf).await.map_err(|err| ExecutorError::Transport {
            tool: self.tool.clone(),
            reason: format!("failed to read reply length: {err}"),
        })?;
        let len = u32::from_be_bytes(len_buf) as usize;

        let mut body = vec![0u8; len];
        self.stdout.read_exact(&mut body).await.map_err(|err| ExecutorError::Transport {
            tool: self.tool.clone(),
            reason: format!("failed to read reply body: {err}"),
        })?;
        Ok(body)
    }

    /// Invoke `method` with `params`, enforcing the 300s per-call timeout.
    pub async fn invoke(&mut self, method: &str, params: Value) -> Result<Value, ExecutorError> {
        tokio::time::timeout(CALL_TIMEOUT, self.invoke_inner(method, params))
            .await
            .map_err(|_| ExecutorError::Timeout { tool: self.tool.clone() })?
    }

    async fn invoke_inner(&mut self, method: &str, params: Value) -> Result<Value, ExecutorError> {
        let request = FramedRequest { method, params };
        let payload = rmp_serde::to_vec_named(&request).map_err(|err| ExecutorError::Transport {
            tool: self.tool.clone(),
            reason: format!("failed to encode request: {err}"),
        })?;
        self.write_frame(&payload).await?;

        let body = self.read_frame().await?;
        let reply: FramedReply = rmp_serde::from_slice(&body).map_err(|err| ExecutorError::Transport {
            tool: self.tool.clone(),
            reason: format!("failed to decode reply: {err}"),
        })?;

        envelope_to_result(&self.tool, reply.into())
    }

    /// Reap the child. The framed contract defines no shutdown message, so
    /// this is a direct kill.
    pub async fn close(&mut self) {
        debug!(tool = %self.tool, "tearing down framed child");
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }
}
