//! Session introspection API.
//!
//! The only externally exposed session operation is reading a
//! transcript — session creation/reset happens implicitly as a
//! side effect of sending a chat message, not through a dedicated
//! endpoint.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/sessions/:key/transcript
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Return the full durable transcript for a session key.
///
/// `404` if the session key has never been seen (no entry in the
/// session store) — a known session with no turns yet still resolves
/// to `200` with an empty `lines` array.
pub async fn get_transcript(
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

    match state.persistence.read_transcript(&entry.session_id) {
        Ok(lines) => Json(serde_json::json!({
            "session_key": session_key,
            "session_id": entry.session_id,
            "lines": lines,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(session_key, error = %e, "reading transcript failed");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
