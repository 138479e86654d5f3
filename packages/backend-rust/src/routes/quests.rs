use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::response::AppError;
use crate::routes::require_user;
use crate::services::quests::{self, Quest, QuestSet};
use crate::state::AppState;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
struct QuestQuery {
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuestProgressRequest {
    quest_id: String,
    increment: i64,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuestProgressData {
    quest: Quest,
    quest_set: Option<QuestSet>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_quests).post(update_progress))
}

async fn get_quests(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<QuestQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_user(&state, &headers).await?;

    let date = match query.date {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| AppError::validation("date must be formatted YYYY-MM-DD"))?,
        None => Utc::now().date_naive(),
    };

    let set = quests::get_or_generate_quest_set(db.as_ref(), &user.id, date).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: set,
    }))
}

async fn update_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<QuestProgressRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_user(&state, &headers).await?;
    let today = Utc::now().date_naive();

    let quest = quests::update_quest_progress(
        db.as_ref(),
        &user.id,
        &body.quest_id,
        body.increment,
        body.reason.as_deref(),
        today,
    )
    .await?;

    let quest_set = quests::load_quest_set(db.as_ref(), &user.id, today).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: QuestProgressData { quest, quest_set },
    }))
}
