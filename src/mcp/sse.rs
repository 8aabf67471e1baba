//! MCP over HTTP with server-sent events.
//!
//! `GET /sse` opens a session and announces its POST endpoint. Requests
//! arrive on `POST /message?sessionId=<id>` and their responses are pushed
//! back as `message` events on the session's stream. Dropping the stream
//! ends the session and cancels whatever it still has running.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::handler::{InFlight, McpHandler, SERVER_NAME};
use super::protocol::{JsonRpcMessage, JsonRpcResponse};
use crate::error::{AthenaError, Result};

/// Responses buffered per session before senders wait.
const SESSION_BUFFER: usize = 32;

struct Session {
    sender: mpsc::Sender<JsonRpcResponse>,
    cancel: CancellationToken,
    in_flight: Arc<InFlight>,
}

/// Sessions and shared handler for the SSE transport.
pub struct SseState {
    handler: Arc<McpHandler>,
    sessions: Mutex<HashMap<Uuid, Session>>,
    shutdown: CancellationToken,
}

impl SseState {
    pub fn new(handler: Arc<McpHandler>, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            handler,
            sessions: Mutex::new(HashMap::new()),
            shutdown,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new session and returns the receiving end of its stream.
    pub fn open_session(&self) -> (Uuid, mpsc::Receiver<JsonRpcResponse>) {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(SESSION_BUFFER);
        self.lock().insert(
            id,
            Session {
                sender,
                cancel: self.shutdown.child_token(),
                in_flight: Arc::new(InFlight::default()),
            },
        );
        info!(session_id = %id, "SSE session opened");
        (id, receiver)
    }

    /// Drops a session and cancels its requests.
    pub fn close_session(&self, id: &Uuid) {
        if let Some(session) = self.lock().remove(id) {
            session.cancel.cancel();
            info!(session_id = %id, "SSE session closed");
        }
    }

    /// Drops every session so open streams end.
    pub fn close_all(&self) {
        let sessions: Vec<Session> = self.lock().drain().map(|(_, session)| session).collect();
        for session in &sessions {
            session.cancel.cancel();
        }
        if !sessions.is_empty() {
            info!(count = sessions.len(), "Closed SSE sessions");
        }
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    /// Accepts one POSTed message for `session_id`.
    ///
    /// Requests are handled in the background; the HTTP reply only says
    /// whether the message was accepted.
    pub fn accept(&self, session_id: &str, body: &str) -> (StatusCode, String) {
        let Ok(id) = Uuid::parse_str(session_id) else {
            return (StatusCode::BAD_REQUEST, format!("Invalid sessionId: {session_id}"));
        };

        let (sender, cancel, in_flight) = match self.lock().get(&id) {
            Some(session) => (
                session.sender.clone(),
                session.cancel.clone(),
                Arc::clone(&session.in_flight),
            ),
            None => return (StatusCode::NOT_FOUND, format!("Unknown session: {id}")),
        };

        let message = match JsonRpcMessage::parse(body) {
            Ok(message) => message,
            Err(response) => {
                let text = response
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "Invalid message".to_string());
                return (StatusCode::BAD_REQUEST, text);
            }
        };

        if let Some(key) = message.cancelled_request_key() {
            let found = in_flight.cancel(&key);
            debug!(session_id = %id, request_id = %key, found, "Cancellation requested");
            return (StatusCode::ACCEPTED, "Accepted".to_string());
        }

        let token = cancel.child_token();
        let guard = in_flight.track(&message, token.clone());
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            let response = handler.handle(message, &token).await;
            drop(guard);
            if let Some(response) = response {
                if sender.send(response).await.is_err() {
                    debug!(session_id = %id, "Session closed before response was sent");
                }
            }
        });

        (StatusCode::ACCEPTED, "Accepted".to_string())
    }
}

/// Event stream for one session; closes the session when dropped.
struct SessionStream {
    id: Uuid,
    state: Arc<SseState>,
    endpoint: Option<Event>,
    responses: ReceiverStream<JsonRpcResponse>,
}

impl Stream for SessionStream {
    type Item = std::result::Result<Event, axum::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(endpoint) = self.endpoint.take() {
            return Poll::Ready(Some(Ok(endpoint)));
        }
        Pin::new(&mut self.responses)
            .poll_next(cx)
            .map(|response| response.map(|r| Event::default().event("message").json_data(r)))
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.state.close_session(&self.id);
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageQuery {
    session_id: String,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": SERVER_NAME }))
}

async fn open_stream(State(state): State<Arc<SseState>>) -> impl IntoResponse {
    let (id, receiver) = state.open_session();
    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/message?sessionId={id}"));

    Sse::new(SessionStream {
        id,
        state,
        endpoint: Some(endpoint),
        responses: ReceiverStream::new(receiver),
    })
    .keep_alive(KeepAlive::default())
}

async fn post_message(
    State(state): State<Arc<SseState>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> (StatusCode, String) {
    state.accept(&query.session_id, &body)
}

/// Builds the HTTP router for the SSE transport.
pub fn router(state: Arc<SseState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/sse", get(open_stream))
        .route("/message", post(post_message))
        .layer(cors)
        .with_state(state)
}

/// Serves MCP over HTTP+SSE until `shutdown` fires.
pub async fn serve_sse(
    handler: Arc<McpHandler>,
    host: &str,
    port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    let address = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| AthenaError::transport(format!("Failed to bind to {address}: {e}")))?;
    info!(address = %address, "Serving MCP over SSE");

    let state = SseState::new(handler, shutdown.clone());
    let app = router(Arc::clone(&state));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            state.close_all();
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "SSE server stopped with an error");
            AthenaError::transport(format!("HTTP server error: {e}"))
        })
}
