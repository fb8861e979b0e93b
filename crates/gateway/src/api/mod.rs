pub mod auth;
pub mod chat;
pub mod runs;
pub mod sessions;
pub mod tasks;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the bearer-token middleware in [`auth`]).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new().route("/v1/health", get(health));

    let protected = Router::new()
        .route("/v1/chat", post(chat::chat))
        .route("/v1/chat/ws", get(chat::chat_ws))
        .route("/v1/sessions/:key/transcript", get(sessions::get_transcript))
        .route("/v1/tasks/:session_key", get(tasks::get_task))
        .route("/v1/tasks/:session_key", delete(tasks::cancel_task))
        .route("/v1/runs", get(runs::list_runs))
        .route("/v1/runs/:id", get(runs::get_run))
        .route_layer(middleware::from_fn_with_state(state, auth::require_api_token));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> axum::response::Json<serde_json::Value> {
    axum::response::Json(serde_json::json!({
        "status": "ok",
        "providers": state.llm.list_providers(),
        "sessions": state.sessions.list().len(),
    }))
}
