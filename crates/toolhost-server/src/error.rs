//! Maps every internal error type onto `{error: <message>}` with an
//! appropriate status code (§6: "Error responses use `{error: <message>}`
//! with an appropriate status").

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use toolhost_broker::BrokerError;
use toolhost_executor::ExecutorError;
use toolhost_filestore::StoreError;
use toolhost_registry::RegistryError;

/// Any failure a route handler can return.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request was unauthenticated or carried the wrong credential.
    #[error("unauthorized")]
    Unauthorized,

    /// The request body or multipart form was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// This host is not running in the mode the route requires.
    #[error("{0}")]
    WrongHostMode(&'static str),

    /// Failure from the executor.
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// Failure from the tool registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Failure from the file store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Failure from the broker.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::WrongHostMode(_) => StatusCode::BAD_REQUEST,
            ApiError::Executor(err) => executor_status(err),
            ApiError::Registry(err) => registry_status(err),
            ApiError::Store(err) => store_status(err),
            ApiError::Broker(err) => broker_status(err),
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn executor_status(err: &ExecutorError) -> StatusCode {
    match err {
        ExecutorError::ToolNotFound { .. } | ExecutorError::MethodNotFound { .. } => StatusCode::NOT_FOUND,
        ExecutorError::WrongMode { .. } => StatusCode::BAD_REQUEST,
        ExecutorError::NotRunning { .. } => StatusCode::CONFLICT,
        ExecutorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ExecutorError::Transport { .. } => StatusCode::BAD_GATEWAY,
        ExecutorError::ToolError { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ExecutorError::StartupFailed { .. } | ExecutorError::Provision(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ExecutorError::Registry(err) => registry_status(err),
    }
}

fn registry_status(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
        RegistryError::AlreadyInstalled { .. } => StatusCode::CONFLICT,
        RegistryError::Manifest(_) | RegistryError::FetchFailed { .. } => StatusCode::BAD_REQUEST,
        RegistryError::Provision(_) | RegistryError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Database(_) | StoreError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn broker_status(err: &BrokerError) -> StatusCode {
    match err {
        BrokerError::UnknownChild { .. } => StatusCode::NOT_FOUND,
        BrokerError::NoHealthyOwner { .. } => StatusCode::SERVICE_UNAVAILABLE,
        BrokerError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        BrokerError::StoreProxyNotImplemented => StatusCode::NOT_IMPLEMENTED,
    }
}
