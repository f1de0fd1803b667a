//! Per-session Streamable HTTP transport.
//!
//! Each session owns one [`SessionTransport`]. POST bodies are dispatched to
//! the session's [`McpServer`] and answered either as JSON or as a short SSE
//! stream; a GET opens the standalone stream that carries server-initiated
//! messages. Those messages are numbered and kept in a bounded replay buffer
//! so a reconnecting client can resume with `Last-Event-ID`.

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ErrorBody, RequestId};
use crate::error::{Error, Result};
use crate::mcp::protocol::JsonRpcRequest;
use crate::mcp::server::McpServer;
use crate::mcp::transport::{Message, CHANNEL_CAPACITY};

/// Header carrying the session id.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Header a reconnecting client uses to resume the standalone stream.
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Server-initiated events retained for replay.
pub const REPLAY_CAPACITY: usize = 128;

/// Keep-alive interval on open event streams.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

const SSE_MESSAGE_EVENT: &str = "message";
const EVENT_STREAM_MIME: &str = "text/event-stream";

#[derive(Debug, Clone)]
struct StoredEvent {
    id: u64,
    data: String,
}

#[derive(Debug, Default)]
struct ReplayBuffer {
    events: VecDeque<StoredEvent>,
    last_id: u64,
}

/// Numbered log of server-initiated messages.
///
/// Appending and subscribing take the same lock, so a subscriber sees every
/// event exactly once: either in its backlog or on the live channel.
struct EventLog {
    live: broadcast::Sender<StoredEvent>,
    replay: Mutex<ReplayBuffer>,
}

impl EventLog {
    fn new() -> Self {
        let (live, _) = broadcast::channel(REPLAY_CAPACITY);
        Self {
            live,
            replay: Mutex::new(ReplayBuffer::default()),
        }
    }

    async fn push(&self, data: String) -> u64 {
        let mut replay = self.replay.lock().await;
        replay.last_id += 1;
        let event = StoredEvent {
            id: replay.last_id,
            data,
        };
        if replay.events.len() == REPLAY_CAPACITY {
            replay.events.pop_front();
        }
        replay.events.push_back(event.clone());
        // No open stream is fine; the event stays in the replay buffer.
        let _ = self.live.send(event);
        replay.last_id
    }

    async fn subscribe(
        &self,
        last_event_id: Option<u64>,
    ) -> (Vec<StoredEvent>, broadcast::Receiver<StoredEvent>) {
        let replay = self.replay.lock().await;
        let backlog = match last_event_id {
            Some(last) => replay
                .events
                .iter()
                .filter(|event| event.id > last)
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        (backlog, self.live.subscribe())
    }

    #[cfg(test)]
    async fn last_id(&self) -> u64 {
        self.replay.lock().await.last_id
    }
}

/// Clears the open-stream flag when the standalone stream is dropped.
struct StreamGuard(Arc<AtomicBool>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Transport bound to one session id.
pub struct SessionTransport {
    session_id: String,
    server: Arc<McpServer>,
    events: Arc<EventLog>,
    closed: AtomicBool,
    stream_open: Arc<AtomicBool>,
    shutdown: CancellationToken,
    json_response: bool,
}

impl SessionTransport {
    /// Bind `server` to a new transport for `session_id`.
    ///
    /// Server-initiated messages are forwarded into the session's event log
    /// until the server disconnects.
    pub async fn connect(
        session_id: impl Into<String>,
        server: Arc<McpServer>,
        json_response: bool,
    ) -> Arc<Self> {
        let session_id = session_id.into();
        let (tx, mut rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
        server.connect(tx).await;

        let events = Arc::new(EventLog::new());
        let log = events.clone();
        let sid = session_id.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg.to_json() {
                    Ok(data) => {
                        let id = log.push(data).await;
                        debug!(session_id = %sid, event_id = id, "Queued server message");
                    }
                    Err(e) => warn!(session_id = %sid, "Failed to serialize server message: {}", e),
                }
            }
        });

        Arc::new(Self {
            session_id,
            server,
            events,
            closed: AtomicBool::new(false),
            stream_open: Arc::new(AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
            json_response,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn server(&self) -> &Arc<McpServer> {
        &self.server
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Handle a POST body: one JSON-RPC message or a batch.
    pub async fn handle_post(&self, headers: &HeaderMap, body: Value, request_id: &RequestId) -> Response {
        if self.is_closed() {
            return self.closed_response(request_id);
        }

        let (items, is_batch) = match body {
            Value::Array(items) => (items, true),
            other => (vec![other], false),
        };
        if items.is_empty() {
            return self.invalid_message(request_id, "Empty batch");
        }

        let mut requests: Vec<JsonRpcRequest> = Vec::new();
        for item in items {
            match Message::from_value(item) {
                Ok(Message::Request(req)) => requests.push(req),
                Ok(other) => {
                    self.server.handle_message(other).await;
                }
                Err(e) => return self.invalid_message(request_id, &e.to_string()),
            }
        }

        if requests.is_empty() {
            return self.tag(StatusCode::ACCEPTED.into_response());
        }

        if !self.json_response && accepts_event_stream(headers) {
            return self.tag(self.reply_stream(requests));
        }

        let mut responses = Vec::with_capacity(requests.len());
        for req in requests {
            responses.push(self.server.handle_request(req).await);
        }
        let response = if is_batch {
            Json(responses).into_response()
        } else {
            match responses.pop() {
                Some(single) => Json(single).into_response(),
                None => StatusCode::ACCEPTED.into_response(),
            }
        };
        self.tag(response)
    }

    /// Handle a GET: open the standalone event stream.
    pub async fn handle_get(&self, headers: &HeaderMap, request_id: &RequestId) -> Response {
        if self.is_closed() {
            return self.closed_response(request_id);
        }
        if !accepts_event_stream(headers) {
            return ErrorBody::new("Not Acceptable: Client must accept text/event-stream", request_id)
                .session(&self.session_id)
                .into_response(StatusCode::NOT_ACCEPTABLE);
        }
        if self
            .stream_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return ErrorBody::new("Conflict: Only one SSE stream is allowed per session", request_id)
                .session(&self.session_id)
                .into_response(StatusCode::CONFLICT);
        }
        let guard = StreamGuard(self.stream_open.clone());

        let last_event_id = headers
            .get(LAST_EVENT_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let (backlog, live) = self.events.subscribe(last_event_id).await;
        debug!(
            session_id = %self.session_id,
            replayed = backlog.len(),
            "Opening event stream"
        );

        let live = BroadcastStream::new(live).filter_map(|event| async move { event.ok() });
        let events = stream::iter(backlog)
            .chain(live)
            .map(move |event| {
                let _open = &guard;
                Ok::<_, Infallible>(
                    Event::default()
                        .id(event.id.to_string())
                        .event(SSE_MESSAGE_EVENT)
                        .data(event.data),
                )
            })
            .take_until(self.shutdown.clone().cancelled_owned());

        let response = Sse::new(events)
            .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
            .into_response();
        self.tag(response)
    }

    /// Close the transport and end its open streams.
    ///
    /// Closing an already closed transport is an error.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(Error::TransportClosed(self.session_id.clone()));
        }
        self.shutdown.cancel();
        self.server.disconnect().await;
        debug!(session_id = %self.session_id, "Transport closed");
        Ok(())
    }

    /// Replies as an SSE stream that ends after the last response.
    fn reply_stream(&self, requests: Vec<JsonRpcRequest>) -> Response {
        let server = self.server.clone();
        let replies = stream::iter(requests)
            .then(move |req| {
                let server = server.clone();
                async move { server.handle_request(req).await }
            })
            .map(|response| Event::default().event(SSE_MESSAGE_EVENT).json_data(response))
            .take_until(self.shutdown.clone().cancelled_owned());

        Sse::new(replies)
            .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
            .into_response()
    }

    fn tag(&self, mut response: Response) -> Response {
        if let Ok(value) = HeaderValue::from_str(&self.session_id) {
            response.headers_mut().insert(SESSION_ID_HEADER, value);
        }
        response
    }

    fn invalid_message(&self, request_id: &RequestId, message: &str) -> Response {
        let response = ErrorBody::new("Invalid JSON-RPC message", request_id)
            .code("INVALID_REQUEST")
            .message(message)
            .session(&self.session_id)
            .into_response(StatusCode::BAD_REQUEST);
        self.tag(response)
    }

    fn closed_response(&self, request_id: &RequestId) -> Response {
        let error = Error::TransportClosed(self.session_id.clone());
        ErrorBody::new("Session not found", request_id)
            .code("SESSION_CLOSED")
            .message(error.to_string())
            .session(&self.session_id)
            .into_response(StatusCode::NOT_FOUND)
    }
}

/// Whether the client accepts an event stream reply.
pub fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains(EVENT_STREAM_MIME))
}
