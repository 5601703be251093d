use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use toolhost_executor::{Executor, ExecutorError};
use toolhost_provisioner::{EnvironmentHandle, ProvisionError, Provisioner};
use toolhost_registry::ToolRegistry;
use toolhost_types::ToolManifest;

struct NoopProvisioner;

#[async_trait]
impl Provisioner for NoopProvisioner {
    async fn ensure(&self, manifest: &ToolManifest) -> Result<(EnvironmentHandle, bool), ProvisionError> {
        Ok((
            EnvironmentHandle {
                env_dir: PathBuf::from("/envs").join(&manifest.name),
                interpreter: PathBuf::from("/usr/bin/python3"),
            },
            true,
        ))
    }
}

fn write_manifest(dir: &std::path::Path, body: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("tool.yaml"), body).unwrap();
}

async fn registry_with(source_dir: &std::path::Path) -> (tempfile::TempDir, Arc<ToolRegistry>) {
    let tools_root = tempfile::tempdir().unwrap();
    let registry = Arc::new(ToolRegistry::new(tools_root.path(), Arc::new(NoopProvisioner)));
    registry.install(source_dir.to_str().unwrap()).await.unwrap();
    (tools_root, registry)
}

#[tokio::test]
async fn call_on_unknown_tool_is_a_client_error() {
    let tools_root = tempfile::tempdir().unwrap();
    let registry = Arc::new(ToolRegistry::new(tools_root.path(), Arc::new(NoopProvisioner)));
    let executor = Executor::new(registry);

    let err = executor.call("ghost", "anything", serde_json::json!({})).await.unwrap_err();
    assert!(matches!(err, ExecutorError::ToolNotFound { .. }));
}

#[tokio::test]
async fn call_on_unknown_method_is_a_client_error() {
    let source_dir = tempfile::tempdir().unwrap();
    write_manifest(
        source_dir.path(),
        "name: calc\nversion: \"1.0.0\"\nruntime:\n  language: python3.11\n  entrypoint: main.py\nrpc:\n  add:\n    description: add\n    input_schema: { type: object }\n    output_schema: { type: integer }\n",
    );
    let (_tools_root, registry) = registry_with(source_dir.path()).await;
    let executor = Executor::new(registry);

    let err = executor.call("calc", "subtract", serde_json::json!({})).await.unwrap_err();
    assert!(matches!(err, ExecutorError::MethodNotFound { .. }));
}

#[tokio::test]
async fn starting_a_oneshot_tool_is_rejected() {
    let source_dir = tempfile::tempdir().unwrap();
    write_manifest(
        source_dir.path(),
        "name: calc\nversion: \"1.0.0\"\nruntime:\n  language: python3.11\n  mode: oneshot\n  entrypoint: main.py\nrpc: {}\n",
    );
    let (_tools_root, registry) = registry_with(source_dir.path()).await;
    let executor = Executor::new(registry);

    let err = executor.start("calc").await.unwrap_err();
    assert!(matches!(err, ExecutorError::WrongMode { .. }));
}

#[tokio::test]
async fn calling_a_persistent_tool_before_start_is_not_running() {
    let source_dir = tempfile::tempdir().unwrap();
    write_manifest(
        source_dir.path(),
        "name: svc\nversion: \"1.0.0\"\nruntime:\n  language: python3.11\n  mode: persistent\n  transport: framed\n  entrypoint: main.py\nrpc:\n  ping:\n    description: ping\n    input_schema: { type: object }\n    output_schema: { type: string }\n",
    );
    let (_tools_root, registry) = registry_with(source_dir.path()).await;
    let executor = Executor::new(registry);

    let err = executor.call("svc", "ping", serde_json::json!({})).await.unwrap_err();
    assert!(matches!(err, ExecutorError::NotRunning { .. }));
}

#[tokio::test]
async fn stopping_a_never_started_tool_is_a_harmless_no_op() {
    let source_dir = tempfile::tempdir().unwrap();
    write_manifest(
        source_dir.path(),
        "name: svc\nversion: \"1.0.0\"\nruntime:\n  language: python3.11\n  mode: persistent\n  entrypoint: main.py\nrpc: {}\n",
    );
    let (_tools_root, registry) = registry_with(source_dir.path()).await;
    let executor = Executor::new(registry);

    executor.stop("svc").await.unwrap();
}
