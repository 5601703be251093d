#![forbid(unsafe_code)]
//! Public JSON/HTTP surface: tool listing and calls, the file store,
//! legacy output refs, and broker aggregation (§4.5, §4.6, §4.7).

mod auth;
mod error;
mod handlers;
mod request_params;
mod schema_wrap;
mod state;

pub use error::ApiError;
pub use state::{AppState, HostMode};

use axum::routing::{any, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Build the full router for `state`. Broker-mode state gets the
/// registration/heartbeat/proxy routes under `/v1/tools`; standalone
/// state gets the explicit info/schema/lifecycle/call routes. The file
/// store and legacy output-ref routes are always mounted; each handler
/// reports `WrongHostMode` itself when the corresponding manager is
/// absent.
pub fn build_router(state: AppState) -> Router {
    let tool_routes = match &state.mode {
        HostMode::Standalone { .. } => Router::new()
            .route("/v1/tools", get(handlers::tools::list))
            .route("/v1/tools/:name", get(handlers::tools::info))
            .route("/v1/tools/:name/schema", get(handlers::tools::schema))
            .route("/v1/tools/:name/start", post(handlers::tools::start))
            .route("/v1/tools/:name/stop", post(handlers::tools::stop))
            .route("/v1/tools/:name/:method", post(handlers::tools::call)),
        HostMode::Broker { .. } => Router::new()
            .route("/v1/tools", get(handlers::broker_routes::list_tools))
            .route("/v1/broker/register", post(handlers::broker_routes::register))
            .route("/v1/broker/heartbeat", post(handlers::broker_routes::heartbeat))
            .route("/v1/tools/:name", any(handlers::broker_routes::proxy_root))
            .route("/v1/tools/:name/*rest", any(handlers::broker_routes::proxy_sub)),
    };

    let store_routes = Router::new()
        .route("/v1/store", get(handlers::store::list).post(handlers::store::import))
        .route("/v1/store/:id", get(handlers::store::info).patch(handlers::store::update).delete(handlers::store::delete))
        .route("/v1/store/:id/content", get(handlers::store::content))
        .route("/v1/files/:name", get(handlers::files_legacy::get).delete(handlers::files_legacy::delete));

    Router::new()
        .route("/health", get(handlers::health::health))
        .merge(tool_routes)
        .merge(store_routes)
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth::require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
