//! Axum HTTP handlers for the web server
//!
//! Provides the stateless `/mcp` endpoint, the session-bearing `/mcp-stream`
//! endpoint, and the plain metadata endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::domain::registry::ToolRegistry;
use crate::errors::AppError;
use crate::mcp::{server::dispatch, session};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
    pub stream_endpoint: &'static str,
}

pub async fn root(State(state): State<AppState>) -> String {
    render_tool_summary(&state.registry)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: "/mcp",
        stream_endpoint: "/mcp-stream",
    })
}

pub async fn mcp_endpoint(State(state): State<AppState>, body: Bytes) -> Response {
    let (status, envelope) = dispatch(&state.registry, &body).await;
    (status, Json(envelope)).into_response()
}

pub async fn mcp_stream_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    session::handle_post(&state, &headers, &body).await
}

pub async fn mcp_stream_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    session::handle_delete(&state, &headers).await
}

pub fn render_tool_summary(registry: &ToolRegistry) -> String {
    let mut summary = format!(
        "{} {}\n\nTools:\n",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    for tool in registry.list() {
        let parameters = tool.schema().property_names().collect::<Vec<_>>().join(", ");
        summary.push_str(&format!(
            "- {}({}): {}\n",
            tool.name(),
            parameters,
            tool.description()
        ));
    }

    summary.push_str("\nPOST /mcp for JSON-RPC calls, /mcp-stream for MCP sessions.\n");
    summary
}
