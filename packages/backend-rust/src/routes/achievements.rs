use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::response::AppError;
use crate::routes::require_user;
use crate::services::achievements::{self, Achievement, MicroWin};
use crate::state::AppState;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AchievementsData {
    achievements: Vec<Achievement>,
    micro_wins: Vec<MicroWin>,
    most_impressive: Option<Achievement>,
}

#[derive(Serialize)]
struct ViewedData {
    id: String,
    viewed: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_achievements))
        .route("/:id/viewed", post(mark_viewed))
}

async fn get_achievements(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_user(&state, &headers).await?;

    let achievements = achievements::get_achievements(db.as_ref(), &user.id).await?;
    let micro_wins = achievements::micro_wins(&achievements);
    let most_impressive = achievements::most_impressive(&achievements);

    Ok(Json(SuccessResponse {
        success: true,
        data: AchievementsData {
            achievements,
            micro_wins,
            most_impressive,
        },
    }))
}

async fn mark_viewed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_user(&state, &headers).await?;

    achievements::mark_viewed(db.as_ref(), &user.id, &id).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: ViewedData { id, viewed: true },
    }))
}
