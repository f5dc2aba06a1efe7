//! Session-bearing MCP surface mounted at `/mcp-stream`
//!
//! Implements the request/response half of the MCP streamable HTTP transport
//! with JSON responses. `initialize` opens a session identified by the
//! `mcp-session-id` header; every later request must carry it. Tool listing
//! and invocation go through the same dispatcher routines as `/mcp`, so both
//! surfaces agree on results and error codes. In-flight calls can be cancelled
//! per request (`notifications/cancelled`) or all at once by deleting the
//! session.

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_mcp_sdk::schema::{
    CallToolResult, Implementation, InitializeResult, ProtocolVersion, ServerCapabilities,
    ServerCapabilitiesTools,
};
use serde_json::{json, Value};
use tokio::{
    sync::{watch, RwLock},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_IDLE_TIMEOUT};
use crate::errors::{AppError, DispatchError};
use crate::mcp::rpc::{text_content, RequestEnvelope, ResponseEnvelope, REQUEST_CANCELLED};
use crate::mcp::server::{call_tool, tools_list_result};
use crate::AppState;

pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug)]
pub struct Session {
    id: String,
    protocol_version: String,
    closed: watch::Sender<bool>,
    last_seen: Mutex<Instant>,
    in_flight: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl Session {
    fn new(id: String, protocol_version: String) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            protocol_version,
            closed,
            last_seen: Mutex::new(Instant::now()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// Registers an in-flight request and returns its cancellation signal.
    ///
    /// Returns `None` while another request with the same id is still running.
    pub fn track(&self, request_key: String) -> Option<watch::Receiver<bool>> {
        match self.lock_in_flight().entry(request_key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let (sender, receiver) = watch::channel(false);
                slot.insert(sender);
                Some(receiver)
            }
        }
    }

    pub fn untrack(&self, request_key: &str) {
        self.lock_in_flight().remove(request_key);
    }

    pub fn cancel(&self, request_key: &str) -> bool {
        match self.lock_in_flight().remove(request_key) {
            Some(sender) => {
                sender.send_replace(true);
                true
            }
            None => false,
        }
    }

    pub fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Idle past `timeout` with nothing running.
    fn expired(&self, timeout: Duration) -> bool {
        let idle_for = self
            .last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed();
        idle_for >= timeout && self.lock_in_flight().is_empty()
    }

    fn close(&self) {
        self.closed.send_replace(true);
        for (_, sender) in self.lock_in_flight().drain() {
            sender.send_replace(true);
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<bool>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Open sessions, bounded in number and dropped after sitting idle.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    idle_timeout: Duration,
    max_sessions: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_IDLE_TIMEOUT, DEFAULT_MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new(idle_timeout: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
            max_sessions,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub async fn create(&self, protocol_version: String) -> Result<Arc<Session>, AppError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            self.drop_idle(&mut sessions);
        }
        if sessions.len() >= self.max_sessions {
            return Err(AppError::unavailable(
                "session_limit",
                "too many open sessions, retry later",
            ));
        }

        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), protocol_version));
        sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    /// Looks up a live session and marks it as used. An idle one is dropped instead.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        let session = self.sessions.read().await.get(id).cloned()?;
        if session.expired(self.idle_timeout) {
            self.terminate(id).await;
            debug!(session_id = %id, "idle session expired");
            return None;
        }

        session.touch();
        Some(session)
    }

    /// Drops every session idle past the timeout; returns how many went.
    pub async fn reap_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        self.drop_idle(&mut sessions)
    }

    fn drop_idle(&self, sessions: &mut HashMap<String, Arc<Session>>) -> usize {
        let before = sessions.len();
        sessions.retain(|_, session| {
            if session.expired(self.idle_timeout) {
                session.close();
                return false;
            }
            true
        });
        before - sessions.len()
    }

    /// Removes the session and cancels whatever it still has running.
    pub async fn terminate(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Sweeps `store` for idle sessions every `period`.
pub fn spawn_session_reaper(store: Arc<SessionStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let reaped = store.reap_idle().await;
            if reaped > 0 {
                let remaining = store.len().await;
                info!(reaped, remaining, "idle sessions reaped");
            }
        }
    })
}

pub async fn handle_post(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Response {
    let request = match RequestEnvelope::from_slice(body) {
        Ok(request) => request,
        Err(rejection) => {
            let (status, envelope) =
                ResponseEnvelope::from_outcome(rejection.id, Err(rejection.error));
            return (status, Json(envelope)).into_response();
        }
    };

    if request.method == "initialize" {
        return initialize(state, request).await;
    }

    let session = match require_session(&state.sessions, headers).await {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };

    if request.is_notification() {
        handle_notification(&session, &request);
        return StatusCode::ACCEPTED.into_response();
    }

    let method = request.method.clone();
    let envelope = match method.as_str() {
        "ping" => ResponseEnvelope::success(request.id, json!({})),
        "tools/list" => ResponseEnvelope::success(request.id, tools_list_result(&state.registry)),
        "tools/call" => call_in_session(state, &session, request).await,
        other => ResponseEnvelope::from_error(
            request.id,
            &DispatchError::MethodNotFound(other.to_string()),
        ),
    };

    json_rpc_response(envelope, None)
}

pub async fn handle_delete(state: &AppState, headers: &HeaderMap) -> Result<StatusCode, AppError> {
    let session_id = session_id_from_headers(headers)?;
    if !state.sessions.terminate(session_id).await {
        return Err(unknown_session());
    }

    info!(session_id = %session_id, "session terminated");
    Ok(StatusCode::NO_CONTENT)
}

async fn initialize(state: &AppState, request: RequestEnvelope) -> Response {
    let protocol_version = match negotiate_protocol_version(&request.params) {
        Ok(version) => version,
        Err(err) => return json_rpc_response(ResponseEnvelope::from_error(request.id, &err), None),
    };

    let result = match initialize_result() {
        Ok(result) => result,
        Err(err) => return AppError::internal(err.to_string()).into_response(),
    };

    let session = match state.sessions.create(protocol_version.to_string()).await {
        Ok(session) => session,
        Err(err) => return err.into_response(),
    };
    info!(
        session_id = %session.id(),
        protocol_version = %session.protocol_version(),
        "session initialized"
    );

    json_rpc_response(
        ResponseEnvelope::success(request.id, result),
        Some(session.id()),
    )
}

fn initialize_result() -> Result<Value, serde_json::Error> {
    serde_json::to_value(InitializeResult {
        server_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            ..Default::default()
        },
        protocol_version: ProtocolVersion::V2024_11_05.into(),
        instructions: None,
        meta: None,
    })
}

/// Clients must offer a version; whatever they offer, the answer is the one we speak.
pub fn negotiate_protocol_version(params: &Value) -> Result<&'static str, DispatchError> {
    let offered = params
        .as_object()
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| DispatchError::invalid_params("protocolVersion is required"))?;

    if offered != SUPPORTED_PROTOCOL_VERSION {
        debug!(
            offered = %offered,
            supported = SUPPORTED_PROTOCOL_VERSION,
            "client offered a different protocol version"
        );
    }

    Ok(SUPPORTED_PROTOCOL_VERSION)
}

fn handle_notification(session: &Session, request: &RequestEnvelope) {
    if request.method != "notifications/cancelled" {
        return;
    }

    if let Some(request_id) = request.params.get("requestId") {
        let cancelled = session.cancel(&request_id.to_string());
        info!(
            session_id = %session.id(),
            request_id = %request_id,
            cancelled,
            "cancellation requested"
        );
    }
}

async fn call_in_session(
    state: &AppState,
    session: &Session,
    request: RequestEnvelope,
) -> ResponseEnvelope {
    let id = request.id;
    let request_key = id.to_string();
    let Some(mut cancelled) = session.track(request_key.clone()) else {
        debug!(session_id = %session.id(), request_id = %id, "request id already in flight");
        return ResponseEnvelope::from_error(id, &DispatchError::InvalidRequest);
    };
    let mut closed = session.closed();

    let outcome = tokio::select! {
        outcome = call_tool(&state.registry, request.params) => Some(outcome),
        true = raised(&mut cancelled) => None,
        true = raised(&mut closed) => None,
    };
    session.untrack(&request_key);

    match outcome {
        Some(outcome) => ResponseEnvelope::from_result(id, outcome.and_then(call_tool_result)),
        None => {
            info!(session_id = %session.id(), request_id = %id, "tool call cancelled");
            ResponseEnvelope::failure(id, REQUEST_CANCELLED, "Request cancelled")
        }
    }
}

async fn raised(signal: &mut watch::Receiver<bool>) -> bool {
    signal.wait_for(|raised| *raised).await.is_ok()
}

fn call_tool_result(text: String) -> Result<Value, DispatchError> {
    serde_json::to_value(CallToolResult {
        content: text_content(text),
        is_error: None,
        meta: None,
        structured_content: None,
    })
    .map_err(|err| DispatchError::Internal(err.to_string()))
}

async fn require_session(store: &SessionStore, headers: &HeaderMap) -> Result<Arc<Session>, AppError> {
    let session_id = session_id_from_headers(headers)?;
    store.get(session_id).await.ok_or_else(unknown_session)
}

fn session_id_from_headers(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .ok_or_else(|| {
            AppError::bad_request("missing_session", "mcp-session-id header is required")
        })?
        .to_str()
        .map_err(|_| {
            AppError::bad_request(
                "invalid_session",
                "mcp-session-id header must be visible ASCII",
            )
        })
}

fn unknown_session() -> AppError {
    AppError::not_found("unknown_session", "session not found or already terminated")
}

fn json_rpc_response(envelope: ResponseEnvelope, session_id: Option<&str>) -> Response {
    let mut response = (StatusCode::OK, Json(envelope)).into_response();
    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
    }
    response
}
