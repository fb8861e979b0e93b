//! Bearer-token authentication middleware for the protected route group.
//!
//! The token is read once at startup ([`crate::bootstrap::build_app_state`])
//! from the env var named by `config.auth.token_env`. When that var was
//! unset, `state.api_token` is `None` and every request passes through —
//! this is the local/dev default. When a token is configured, every
//! protected request must carry it as `Authorization: Bearer <token>`,
//! compared in constant time so response latency can't leak how many
//! leading bytes matched.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Axum middleware that enforces bearer-token authentication on protected
/// routes. Attach via `axum::middleware::from_fn_with_state`.
pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.api_token.as_ref() else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "missing or invalid bearer token" })),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_tokens() {
        let a = b"secret-token";
        let b = b"secret-token";
        assert!(bool::from(a.ct_eq(b)));
    }

    #[test]
    fn constant_time_eq_rejects_different_tokens() {
        let a = b"secret-token";
        let b = b"other-token!";
        assert!(!bool::from(a.ct_eq(b)));
    }
}
