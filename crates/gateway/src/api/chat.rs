//! Chat API — the primary interface for running agent turns.
//!
//! - `POST /v1/chat`  — non-streaming: drains one turn, returns the
//!   full response as a single JSON object.
//! - `GET  /v1/chat/ws` — bidirectional streaming: each `message` frame
//!   starts a turn; `chunk`/`thought`/`action`/`observation`/`end`
//!   frames stream back as they occur; a `cancel` frame stops the
//!   in-flight turn.
//!
//! Both handlers drive the same underlying pipeline
//! ([`crate::runtime::spawn_turn`]) and differ only in how they consume
//! the resulting [`crate::runtime::EventBus`] tag.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::runtime::event_bus::Event;
use crate::runtime::spawn_turn;
use crate::state::AppState;

fn turn_tag(session_id: &str) -> String {
    format!("turn:{session_id}")
}

/// Resolve (or create) the session for a request, honoring the
/// configured idle/daily reset policy. Shared by both handlers.
fn resolve_session(state: &AppState, session_key: &str) -> sa_sessions::SessionEntry {
    let (mut entry, is_new) = state.sessions.resolve_or_create(session_key);
    if is_new {
        tracing::info!(session_key, session_id = %entry.session_id, "new session created");
    } else if let Some(reason) = state.lifecycle.should_reset(&entry, chrono::Utc::now()) {
        tracing::info!(session_key, %reason, "resetting session");
        if let Some(reset) = state.sessions.reset_session(session_key, &reason.to_string()) {
            entry = reset;
        }
    }
    entry
}

/// Pre-flight check: return a structured 503 if no LLM providers are
/// available, instead of letting a turn fail deep inside the loop.
fn require_llm_provider(state: &AppState) -> Result<(), (axum::http::StatusCode, Json<Value>)> {
    if !state.llm.is_empty() {
        return Ok(());
    }
    Err((
        axum::http::StatusCode::SERVICE_UNAVAILABLE,
        Json(serde_json::json!({
            "error": "no_llm_provider",
            "reason": "no LLM providers are configured — set DEFAULT_MODEL_PROVIDER/DEFAULT_MODEL_NAME \
                       or the provider's API key env var",
        })),
    ))
}

/// Bridge a turn's event-bus tag to an async channel. Callers must
/// unsubscribe (`state.event_bus.unsubscribe(&turn_tag(session_id),
/// id)`) once done, or the handler — and the channel sender it closed
/// over — leaks for the life of the process.
fn subscribe_turn(
    state: &AppState,
    session_id: &str,
) -> (mpsc::UnboundedReceiver<Value>, crate::runtime::SubscriptionId) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = state.event_bus.subscribe(
        turn_tag(session_id),
        0,
        std::sync::Arc::new(move |event: &Event| {
            let _ = tx.send(event.payload.clone());
        }),
    );
    (rx, id)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/chat (non-streaming)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_key: Option<String>,
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    if let Err(resp) = require_llm_provider(&state) {
        return resp.into_response();
    }

    let session_key = body
        .session_key
        .unwrap_or_else(|| sa_sessions::default_session_key(&state.config.sessions.agent_id));
    let entry = resolve_session(&state, &session_key);
    let session_id = entry.session_id.clone();

    let (mut rx, subscription_id) = subscribe_turn(&state, &session_id);

    let (message_id, run_id) =
        match spawn_turn(&state, session_key.clone(), session_id.clone(), body.message, body.model) {
            Ok(r) => r,
            Err(e) => {
                state.event_bus.unsubscribe(&turn_tag(&session_id), subscription_id);
                return (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": e.to_string() })),
                )
                    .into_response();
            }
        };

    let mut content = String::new();
    let mut actions = Vec::new();
    let mut error = None;
    let mut cancelled = false;

    while let Some(payload) = rx.recv().await {
        match payload.get("type").and_then(Value::as_str) {
            Some("chunk") => {
                if let Some(c) = payload.get("content").and_then(Value::as_str) {
                    content.push_str(c);
                }
            }
            Some("action") => actions.push(payload.clone()),
            Some("cancelled") => cancelled = true,
            Some("error") => {
                error = payload
                    .get("content")
                    .and_then(Value::as_str)
                    .map(str::to_string);
            }
            Some("end") => break,
            _ => {}
        }
    }

    state.event_bus.unsubscribe(&turn_tag(&session_id), subscription_id);
    state.sessions.touch(&session_key);

    Json(serde_json::json!({
        "session_key": session_key,
        "session_id": session_id,
        "message_id": message_id,
        "run_id": run_id,
        "content": content,
        "actions": actions,
        "cancelled": cancelled,
        "error": error,
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/chat/ws
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ChatWsQuery {
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundFrame {
    Message { content: String },
    Cancel,
}

pub async fn chat_ws(
    State(state): State<AppState>,
    Query(query): Query<ChatWsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, query, socket))
}

async fn handle_socket(state: AppState, query: ChatWsQuery, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();

    if state.llm.is_empty() {
        let _ = sink
            .send(WsMessage::Text(
                serde_json::json!({"type": "error", "content": "no_llm_provider"}).to_string(),
            ))
            .await;
        return;
    }

    let session_key = query
        .session_key
        .unwrap_or_else(|| sa_sessions::default_session_key(&state.config.sessions.agent_id));
    let entry = resolve_session(&state, &session_key);
    let session_id = entry.session_id.clone();

    let (mut rx, subscription_id) = subscribe_turn(&state, &session_id);

    let outbound = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(WsMessage::Text(payload.to_string())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let WsMessage::Text(text) = msg else {
            continue;
        };
        let frame: InboundFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                state.event_bus.emit(
                    turn_tag(&session_id),
                    serde_json::json!({"type": "error", "content": format!("malformed frame: {e}")}),
                );
                continue;
            }
        };

        match frame {
            InboundFrame::Message { content } => {
                if let Err(e) = spawn_turn(
                    &state,
                    session_key.clone(),
                    session_id.clone(),
                    content,
                    query.model.clone(),
                ) {
                    state.event_bus.emit(
                        turn_tag(&session_id),
                        serde_json::json!({"type": "error", "content": e.to_string()}),
                    );
                }
            }
            InboundFrame::Cancel => {
                // `task_registry.get` only snapshots a point-in-time view: the
                // loop itself may reach its own terminal event and finalize
                // first. `finalize_cancelled` re-checks ownership of
                // `message_id` against the registry before doing anything, so
                // whichever side gets there first wins and the other no-ops.
                if let Some(task) = state.task_registry.get(&session_id) {
                    state.task_registry.cancel(&session_id);
                    state.orchestrator.cancel_acknowledged(&session_id);
                    state
                        .orchestrator
                        .finalize_cancelled(&session_id, &task.message_id);
                }
            }
        }
    }

    outbound.abort();
    state.event_bus.unsubscribe(&turn_tag(&session_id), subscription_id);
    state.sessions.touch(&session_key);
}
