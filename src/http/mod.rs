//! Streamable HTTP transport for MCP.
//!
//! One listener multiplexes many MCP sessions. A POST carrying an
//! `initialize` request without a known `Mcp-Session-Id` mints a session:
//! a fresh [`McpServer`](crate::mcp::McpServer) from the [`ServerFactory`]
//! bound to its own [`SessionTransport`]. Later requests name the session in
//! the header and are forwarded to that transport; DELETE ends it.
//!
//! Routes:
//! - `POST|GET|DELETE /mcp` and `/` - session traffic
//! - `GET /health` - liveness
//! - `GET /mcp/info` - server capabilities
//! - `GET /metrics` - Prometheus counters

pub mod origin;
pub mod session;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderMap, HeaderName, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::{SecondsFormat, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::mcp::factory::ServerFactory;
use crate::mcp::protocol::{is_initialize_request, MCP_VERSION};
use crate::metrics::Metrics;
use crate::VERSION;

pub use session::{SessionTransport, LAST_EVENT_ID_HEADER, SESSION_ID_HEADER};

/// Request body limit.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Display name reported by the info endpoints.
pub const DISPLAY_NAME: &str = "Cucumber Studio MCP Server";

const TRANSPORT_NAME: &str = "streamable-http";

/// Short id correlating one HTTP request across logs and error bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self(id)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// JSON error body shared by every HTTP error response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub timestamp: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, request_id: &RequestId) -> Self {
        Self {
            error: error.into(),
            code: None,
            message: None,
            request_id: request_id.0.clone(),
            session_id: None,
            timestamp: timestamp(),
        }
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    fn maybe_session(mut self, session_id: Option<&str>) -> Self {
        self.session_id = session_id.map(String::from);
        self
    }

    pub fn into_response(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// ISO-8601 UTC timestamp with millisecond precision.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Live sessions keyed by session id.
#[derive(Default)]
pub struct SessionTable {
    sessions: RwLock<HashMap<String, Arc<SessionTransport>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionTransport>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn insert(&self, transport: Arc<SessionTransport>) {
        self.sessions
            .write()
            .await
            .insert(transport.session_id().to_string(), transport);
    }

    pub async fn remove(&self, session_id: &str) -> Option<Arc<SessionTransport>> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove and return every session.
    pub async fn drain(&self) -> Vec<Arc<SessionTransport>> {
        self.sessions.write().await.drain().map(|(_, t)| t).collect()
    }
}

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionTable>,
    pub factory: ServerFactory,
    pub metrics: Arc<Metrics>,
    pub json_response: bool,
}

impl AppState {
    pub fn new(factory: ServerFactory, metrics: Arc<Metrics>, json_response: bool) -> Self {
        Self {
            sessions: Arc::new(SessionTable::new()),
            factory,
            metrics,
            json_response,
        }
    }
}

/// Build the router for `state`.
pub fn router(state: AppState, cors: bool) -> Router {
    let mcp = get(handle_get).post(handle_post).delete(handle_delete);

    let app = Router::new()
        .route("/mcp", mcp.clone())
        .route("/", mcp)
        .route("/health", get(health_check))
        .route("/mcp/info", get(server_info))
        .route("/metrics", get(prometheus_metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    // CORS sits inside the origin check so preflights are validated too.
    let app = if cors { app.layer(cors_layer()) } else { app };

    app.layer(middleware::from_fn(origin::validate_origin))
        .layer(middleware::from_fn_with_state(state.clone(), assign_request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::CACHE_CONTROL,
            header::ACCEPT,
            HeaderName::from_static(SESSION_ID_HEADER),
            HeaderName::from_static(LAST_EVENT_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(SESSION_ID_HEADER)])
}

async fn assign_request_id(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    state.metrics.inc_http_requests();
    let request_id = RequestId::generate();
    let span = info_span!("request", request_id = %request_id);
    debug!(parent: &span, method = %request.method(), uri = %request.uri(), "HTTP request");
    request.extensions_mut().insert(request_id);
    next.run(request).instrument(span).await
}

fn session_id_from(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

async fn handle_post(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let session_id = session_id_from(&headers);

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Invalid JSON body: {}", e);
            return ErrorBody::new("Invalid JSON body", &request_id)
                .code("PARSE_ERROR")
                .message(e.to_string())
                .maybe_session(session_id.as_deref())
                .into_response(StatusCode::BAD_REQUEST);
        }
    };

    if let Some(id) = session_id.as_deref() {
        if let Some(transport) = state.sessions.get(id).await {
            debug!(session_id = %id, "Forwarding to existing session");
            return transport.handle_post(&headers, payload, &request_id).await;
        }
    }

    if is_initialize_request(&payload) {
        return initialize_session(&state, &headers, payload, &request_id).await;
    }

    warn!(session_id = ?session_id, "Request without a valid session");
    ErrorBody::new("Session not found. Please initialize first.", &request_id)
        .code("SESSION_NOT_FOUND")
        .maybe_session(session_id.as_deref())
        .into_response(StatusCode::BAD_REQUEST)
}

/// Mint a session for an initialize request and answer it through the new
/// transport.
async fn initialize_session(
    state: &AppState,
    headers: &HeaderMap,
    payload: Value,
    request_id: &RequestId,
) -> Response {
    let session_id = Uuid::new_v4().to_string();
    let server = state.factory.create().await;
    let transport = SessionTransport::connect(session_id.clone(), server, state.json_response).await;

    state.sessions.insert(transport.clone()).await;
    state.metrics.session_opened();
    info!(session_id = %session_id, "Session initialized");

    transport.handle_post(headers, payload, request_id).await
}

async fn handle_get(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> Response {
    if let Some(id) = session_id_from(&headers) {
        match state.sessions.get(&id).await {
            Some(transport) => return transport.handle_get(&headers, &request_id).await,
            None => debug!(session_id = %id, "Unknown session on GET, serving metadata"),
        }
    }

    Json(json!({
        "name": DISPLAY_NAME,
        "version": VERSION,
        "transport": TRANSPORT_NAME,
        "protocol": MCP_VERSION,
        "endpoint": "/mcp",
        "methods": ["POST", "GET", "DELETE"],
        "capabilities": capabilities(),
        "activeSessions": state.sessions.len().await,
        "usage": {
            "initialize": "POST /mcp with initialize request",
            "communicate": "POST /mcp with Mcp-Session-Id header",
            "cleanup": "DELETE /mcp with Mcp-Session-Id header"
        },
        "requestId": request_id.0,
        "timestamp": timestamp()
    }))
    .into_response()
}

async fn handle_delete(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = session_id_from(&headers) else {
        return ErrorBody::new("Session ID required for DELETE requests", &request_id)
            .into_response(StatusCode::BAD_REQUEST);
    };

    let Some(transport) = state.sessions.remove(&session_id).await else {
        return ErrorBody::new("Session not found", &request_id)
            .session(&session_id)
            .into_response(StatusCode::NOT_FOUND);
    };

    if let Err(e) = transport.close().await {
        warn!(session_id = %session_id, "Error closing transport: {}", e);
    }
    state.metrics.session_closed();
    info!(session_id = %session_id, "Session closed");

    Json(json!({
        "message": "Session closed successfully",
        "sessionId": session_id,
        "requestId": request_id.0,
        "timestamp": timestamp()
    }))
    .into_response()
}

fn capabilities() -> Value {
    json!({
        "tools": true,
        "resources": false,
        "prompts": false,
        "sessionManagement": true,
        "streaming": true
    })
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": timestamp(),
        "transport": TRANSPORT_NAME,
        "protocol": MCP_VERSION,
        "activeSessions": state.sessions.len().await
    }))
}

async fn server_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "name": DISPLAY_NAME,
        "version": VERSION,
        "transport": TRANSPORT_NAME,
        "protocol": MCP_VERSION,
        "capabilities": capabilities(),
        "activeSessions": state.sessions.len().await
    }))
}

async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Streamable HTTP server: the session router bound to a TCP listener.
pub struct StreamableHttpServer {
    config: Config,
    state: AppState,
    shutdown: CancellationToken,
    serve_task: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl StreamableHttpServer {
    pub fn new(config: Config, factory: ServerFactory, metrics: Arc<Metrics>) -> Self {
        let state = AppState::new(factory, metrics, config.json_response);
        Self {
            config,
            state,
            shutdown: CancellationToken::new(),
            serve_task: Mutex::new(None),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.state.sessions
    }

    /// Router over this server's session table.
    pub fn router(&self) -> Router {
        router(self.state.clone(), self.config.cors_origin)
    }

    /// Bind the listener and serve in the background.
    pub async fn start(&self) -> Result<SocketAddr> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(addr.as_str())
            .await
            .map_err(|e| Error::HttpServer(format!("failed to bind {}: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;

        let app = self.router();
        let token = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });
        *self.serve_task.lock().await = Some(handle);

        info!("Streamable HTTP server listening on http://{}", local_addr);
        info!("MCP endpoint: http://{}/mcp", local_addr);
        Ok(local_addr)
    }

    /// Close every session, then stop the listener.
    ///
    /// Resolves once the listener has stopped.
    pub async fn close(&self) -> Result<()> {
        let transports = self.state.sessions.drain().await;
        info!(sessions = transports.len(), "Closing sessions");

        let results = join_all(transports.iter().map(|t| t.close())).await;
        for (transport, result) in transports.iter().zip(results) {
            if let Err(e) = result {
                warn!(session_id = %transport.session_id(), "Error closing transport: {}", e);
            }
            self.state.metrics.session_closed();
        }

        self.shutdown.cancel();
        if let Some(handle) = self.serve_task.lock().await.take() {
            handle
                .await
                .map_err(|e| Error::HttpServer(format!("server task failed: {}", e)))??;
        }
        info!("HTTP server stopped");
        Ok(())
    }
}
