mod achievements;
mod health;
mod progress;
mod quests;

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::db::Db;
use crate::response::json_error;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest("/api/progress", progress::router())
        .nest("/api/daily-quests", quests::router())
        .nest("/api/achievements", achievements::router())
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "route not found").into_response()
}

/// Resolves the caller from the request headers. Every /api route goes
/// through here.
pub(crate) async fn require_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(Arc<Db>, crate::auth::AuthUser), crate::response::AppError> {
    let token = crate::auth::extract_token(headers).ok_or_else(|| {
        json_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "authentication token missing",
        )
    })?;

    let db = state.db().ok_or_else(|| {
        json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            "database unavailable",
        )
    })?;

    let user = crate::auth::verify_request_token(db.as_ref(), &token)
        .await
        .map_err(|_| {
            json_error(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "authentication failed",
            )
        })?;

    Ok((db, user))
}
