use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod config;
pub mod domain;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;

use domain::registry::ToolRegistry;
use mcp::session::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::with_sessions(registry, SessionStore::default())
    }

    pub fn with_sessions(registry: Arc<ToolRegistry>, sessions: SessionStore) -> Self {
        Self {
            registry,
            sessions: Arc::new(sessions),
        }
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(http::handlers::root))
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .route("/mcp", post(http::handlers::mcp_endpoint))
        .route(
            "/mcp-stream",
            post(http::handlers::mcp_stream_post).delete(http::handlers::mcp_stream_delete),
        )
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}
