use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::response::AppError;
use crate::routes::require_user;
use crate::services::hooks::{run_post_session_hooks, PostSessionOutcome};
use crate::services::progress::{self, SessionResult, SessionTelemetry, UserProgress};
use crate::state::AppState;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordSessionRequest {
    duration_seconds: f64,
    mistake_count: i64,
    #[serde(default)]
    mistake_categories: Vec<String>,
    #[serde(default)]
    words_spoken: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyGoalRequest {
    #[serde(default)]
    daily_goal_target: Option<i64>,
    #[serde(default)]
    daily_goal_unit: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponseData {
    session_id: String,
    session_result: SessionResult,
    progress: UserProgress,
    #[serde(flatten)]
    outcome: PostSessionOutcome,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_progress))
        .route("/session", post(record_session))
        .route("/daily-goal", patch(update_daily_goal))
}

async fn get_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_user(&state, &headers).await?;
    let today = Utc::now().date_naive();
    let progress = progress::get_or_create_progress(db.as_ref(), &user.id, today).await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: progress,
    }))
}

async fn record_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RecordSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_user(&state, &headers).await?;

    let telemetry = SessionTelemetry {
        duration_seconds: body.duration_seconds,
        mistake_count: body.mistake_count,
        mistake_categories: body.mistake_categories,
        words_spoken: body.words_spoken.max(0),
        session_date: Utc::now().date_naive(),
    };
    telemetry.validate()?;

    let session_id = progress::record_practice_session(db.as_ref(), &user.id, &telemetry).await?;
    let result = progress::apply_session(
        db.as_ref(),
        &user.id,
        &telemetry,
        state.streak_policy(),
    )
    .await?;

    let outcome =
        run_post_session_hooks(db.as_ref(), &user.id, &session_id, &telemetry, &result).await;

    let progress =
        progress::get_or_create_progress(db.as_ref(), &user.id, telemetry.session_date).await?;

    tracing::info!(
        user_id = %user.id,
        session_id = %session_id,
        xp_earned = result.xp_earned,
        level_up = result.level_up,
        streak = result.streak,
        "practice session recorded"
    );

    Ok(Json(SuccessResponse {
        success: true,
        data: SessionResponseData {
            session_id,
            session_result: result,
            progress,
            outcome,
        },
    }))
}

async fn update_daily_goal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DailyGoalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_user(&state, &headers).await?;
    let today = Utc::now().date_naive();

    let progress = progress::set_daily_goal(
        db.as_ref(),
        &user.id,
        body.daily_goal_target,
        body.daily_goal_unit,
        today,
    )
    .await?;

    Ok(Json(SuccessResponse {
        success: true,
        data: progress,
    }))
}
