//! Broker-mode routes: child registration, heartbeat, and the generic
//! tool proxy (§4.7).

use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;

use crate::error::ApiError;
use crate::state::{AppState, HostMode};

fn broker(state: &AppState) -> Result<&std::sync::Arc<toolhost_broker::Broker>, ApiError> {
    match &state.mode {
        HostMode::Broker { broker } => Ok(broker),
        HostMode::Standalone { .. } => Err(ApiError::WrongHostMode("this host is not running in broker mode")),
    }
}

pub async fn list_tools(State(state): State<AppState>) -> Result<Json<Vec<Value>>, ApiError> {
    let broker = broker(&state)?;
    Ok(Json(broker.list_tools().await))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub id: String,
    pub url: String,
    pub name: String,
    pub tools: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterReply {
    pub heartbeat_interval_secs: u64,
}

pub async fn register(State(state): State<AppState>, Json(body): Json<RegisterRequest>) -> Result<Json<RegisterReply>, ApiError> {
    let broker = broker(&state)?;
    let heartbeat_interval_secs = broker.register(&body.id, &body.url, &body.name, body.tools);
    Ok(Json(RegisterReply { heartbeat_interval_secs }))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub id: String,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
}

pub async fn heartbeat(State(state): State<AppState>, Json(body): Json<HeartbeatRequest>) -> Result<StatusCode, ApiError> {
    let broker = broker(&state)?;
    broker.heartbeat(&body.id, body.tools)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Forward a bare `/v1/tools/{name}` request to the child that owns `name`.
pub async fn proxy_root(
    State(state): State<AppState>,
    Path(name): Path<String>,
    connect_info: ConnectInfo<SocketAddr>,
    request: Request,
) -> Result<Response, ApiError> {
    proxy(state, name, connect_info, request).await
}

/// Forward a `/v1/tools/{name}/...` request to the child that owns `name`.
pub async fn proxy_sub(
    State(state): State<AppState>,
    Path((name, _rest)): Path<(String, String)>,
    connect_info: ConnectInfo<SocketAddr>,
    request: Request,
) -> Result<Response, ApiError> {
    proxy(state, name, connect_info, request).await
}

async fn proxy(
    state: AppState,
    name: String,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Result<Response, ApiError> {
    let broker = broker(&state)?;

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let headers = request
        .headers()
        .iter()
        .filter(|(header_name, _)| header_name.as_str().to_ascii_lowercase() != "host")
        .map(|(header_name, value)| (header_name.to_string(), value.to_str().unwrap_or_default().to_string()))
        .collect();

    let body = axum::body::to_bytes(request.into_body(), usize::MAX).await.map_err(|err| ApiError::BadRequest(err.to_string()))?;

    let response = broker.proxy(&name, method, &path, query.as_deref(), headers, body, &client_addr.to_string()).await?;

    let mut builder = Response::builder().status(response.status);
    for (header_name, value) in response.headers {
        builder = builder.header(header_name, value);
    }
    builder.body(axum::body::Body::from(response.body)).map_err(|err| ApiError::BadRequest(err.to_string()))
}
