//! Run introspection API — the execution record behind each turn,
//! distinct from the durable message transcript. A run's `nodes` show
//! the model/tool steps a turn took even when the turn's answer was
//! never finalized (e.g. it errored or was cancelled mid-tool-call).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use uuid::Uuid;

use crate::runtime::RunStatus;
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/runs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub session_key: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

fn parse_status(raw: &str) -> Result<RunStatus, String> {
    match raw {
        "queued" => Ok(RunStatus::Queued),
        "running" => Ok(RunStatus::Running),
        "completed" => Ok(RunStatus::Completed),
        "failed" => Ok(RunStatus::Failed),
        "stopped" => Ok(RunStatus::Stopped),
        other => Err(format!("unknown status: {other}")),
    }
}

pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> impl IntoResponse {
    let status = match query.status.as_deref().map(parse_status) {
        Some(Ok(s)) => Some(s),
        Some(Err(e)) => {
            return (
                axum::http::StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": e })),
            )
                .into_response();
        }
        None => None,
    };

    let (runs, total) = state.run_store.list(
        status,
        query.session_key.as_deref(),
        query.limit,
        query.offset,
    );

    Json(serde_json::json!({
        "runs": runs,
        "total": total,
        "limit": query.limit,
        "offset": query.offset,
    }))
    .into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/runs/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn get_run(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let Ok(run_id) = Uuid::parse_str(&id) else {
        return (
            axum::http::StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "invalid run id" })),
        )
            .into_response();
    };

    match state.run_store.get(&run_id) {
        Some(run) => Json(run).into_response(),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "run not found" })),
        )
            .into_response(),
    }
}
