use std::sync::Arc;

use tool_gateway_mcp::{
    build_app,
    config::Config,
    domain::tools::default_registry,
    logging,
    mcp::session::{spawn_session_reaper, SessionStore},
    AppState,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let registry = Arc::new(default_registry()?);

    let bind_socket = config.bind_socket()?;
    let sessions = SessionStore::new(config.session_idle_timeout, config.max_sessions);
    let state = AppState::with_sessions(Arc::clone(&registry), sessions);
    spawn_session_reaper(Arc::clone(&state.sessions), state.sessions.idle_timeout());
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        tools = registry.len(),
        max_sessions = config.max_sessions,
        session_idle_timeout_secs = config.session_idle_timeout.as_secs(),
        "server starting"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
