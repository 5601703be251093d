//! Standalone-mode tool routes: listing, info, schema, lifecycle, and
//! calls (§4.5).

use axum::extract::{FromRequest, Path, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::request_params::{self, ParsedParams};
use crate::schema_wrap;
use crate::state::{AppState, HostMode};

fn standalone(state: &AppState) -> Result<(&std::sync::Arc<toolhost_registry::ToolRegistry>, &std::sync::Arc<toolhost_executor::Executor>), ApiError> {
    match &state.mode {
        HostMode::Standalone { registry, executor } => Ok((registry, executor)),
        HostMode::Broker { .. } => Err(ApiError::WrongHostMode("this host is running in broker mode")),
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<toolhost_registry::ToolSummary>>, ApiError> {
    let (registry, _) = standalone(&state)?;
    Ok(Json(registry.list_summaries().await))
}

pub async fn info(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Value>, ApiError> {
    let (registry, _) = standalone(&state)?;
    let tool = registry.get(&name).await.ok_or_else(|| toolhost_registry::RegistryError::NotFound { name: name.clone() })?;
    let summary = tool.summary();
    let methods: Value = tool
        .manifest
        .rpc
        .iter()
        .map(|(name, descriptor)| (name.clone(), json!(descriptor.description)))
        .collect::<serde_json::Map<_, _>>()
        .into();
    Ok(Json(json!({
        "name": summary.name,
        "version": summary.version,
        "description": summary.description,
        "capabilities": summary.capabilities,
        "mode": tool.manifest.runtime.mode,
        "status": summary.status,
        "health_status": summary.health_status,
        "methods": methods,
    })))
}

pub async fn schema(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Value>, ApiError> {
    let (registry, _) = standalone(&state)?;
    let tool = registry.get(&name).await.ok_or_else(|| toolhost_registry::RegistryError::NotFound { name: name.clone() })?;
    Ok(Json(serde_json::to_value(&tool.manifest.rpc).map_err(|err| ApiError::BadRequest(err.to_string()))?))
}

pub async fn start(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Value>, ApiError> {
    let (_, executor) = standalone(&state)?;
    executor.start(&name).await?;
    Ok(Json(json!({ "status": "started", "tool": name })))
}

pub async fn stop(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, ApiError> {
    let (_, executor) = standalone(&state)?;
    executor.stop(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn call(State(state): State<AppState>, Path((tool_name, method)): Path<(String, String)>, request: Request) -> Result<Json<Value>, ApiError> {
    let (registry, executor) = standalone(&state)?;

    let content_type = request.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()).unwrap_or("").to_string();

    let ParsedParams { value: params, spooled_files } = if content_type.starts_with("multipart/form-data") {
        let multipart = axum::extract::Multipart::from_request(request, &state).await.map_err(|err| ApiError::BadRequest(err.to_string()))?;
        request_params::from_multipart(multipart, &state.uploads_root).await?
    } else {
        let body = axum::body::to_bytes(request.into_body(), usize::MAX).await.map_err(|err| ApiError::BadRequest(err.to_string()))?;
        request_params::from_json(&body)?
    };

    let call_result = executor.call(&tool_name, &method, params).await;
    request_params::cleanup_spooled(&spooled_files).await;
    let mut result = call_result?;

    if let Some(manager) = &state.output_refs {
        if let Some(tool) = registry.get(&tool_name).await {
            if let Some(descriptor) = tool.manifest.rpc.get(&method) {
                schema_wrap::wrap_file_fields(&mut result, &descriptor.output_schema, manager, &state.outputs_url_base).await;
            }
        }
    }

    Ok(Json(result))
}
