//! Task introspection and cancellation API.
//!
//! The [`TaskRegistry`](crate::runtime::TaskRegistry) is keyed by the
//! stable internal session id, but callers address sessions by their
//! external session key — both endpoints resolve the key through the
//! session store first.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/tasks/:session_key
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Return the running/most-recent task for a session, if any.
///
/// `404` if the session key is unknown. A known session with no task
/// currently registered (never run, or already cleaned up after
/// finalizing) resolves to `200` with `task: null`.
pub async fn get_task(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> impl IntoResponse {
    let Some(entry) = state.sessions.get(&session_key) else {
        return (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "session not found" })),
        )
            .into_response();
    };

    Json(serde_json::json!({
        "session_key": session_key,
        "task": state.task_registry.get(&entry.session_id),
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /v1/tasks/:session_key
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cancel the running task for a session, if one exists.
///
/// `TaskRegistry::cancel` hard-aborts the task's `JoinHandle` alongside
/// flipping its cooperative cancel flag, so the task can never reach
/// its own `Cancelled` branch to finalize itself. We fetch the task's
/// `message_id` before cancelling, then finalize on its behalf.
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(session_key): Path<String>,
) -> impl IntoResponse {
    let Some(entry) = state.sessions.get(&session_key) else {
        return (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "session not found" })),
        )
            .into_response();
    };

    let Some(task) = state.task_registry.get(&entry.session_id) else {
        return (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no running task for this session" })),
        )
            .into_response();
    };

    state.task_registry.cancel(&entry.session_id);
    state.orchestrator.cancel_acknowledged(&entry.session_id);
    state
        .orchestrator
        .finalize_cancelled(&entry.session_id, &task.message_id);

    axum::http::StatusCode::NO_CONTENT.into_response()
}
