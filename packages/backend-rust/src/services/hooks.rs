//! Post-session side effects.
//!
//! Once a practice session's XP and streak have committed, quest progress
//! and achievement detection run as independent follow-ups. A failure in
//! either is logged and swallowed; the session result already stands.

use serde::Serialize;

use crate::db::Db;
use crate::services::achievements::{self, Achievement, SessionFacts};
use crate::services::progress::{SessionResult, SessionTelemetry};
use crate::services::quests::{self, Quest, QuestSet};
use crate::services::ServiceError;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSessionOutcome {
    pub updated_quests: Vec<Quest>,
    pub quest_set: Option<QuestSet>,
    pub achievements: Vec<Achievement>,
}

pub async fn run_post_session_hooks(
    db: &Db,
    user_id: &str,
    session_id: &str,
    telemetry: &SessionTelemetry,
    result: &SessionResult,
) -> PostSessionOutcome {
    let mut outcome = PostSessionOutcome::default();

    match apply_quest_updates(db, user_id, telemetry).await {
        Ok((updated, set)) => {
            outcome.updated_quests = updated;
            outcome.quest_set = set;
        }
        Err(err) => {
            tracing::warn!(user_id, session_id, error = %err, "quest update hook failed");
        }
    }

    match detect_achievements(db, user_id, session_id, telemetry, result).await {
        Ok(found) => outcome.achievements = found,
        Err(err) => {
            tracing::warn!(user_id, session_id, error = %err, "achievement hook failed");
        }
    }

    outcome
}

async fn apply_quest_updates(
    db: &Db,
    user_id: &str,
    telemetry: &SessionTelemetry,
) -> Result<(Vec<Quest>, Option<QuestSet>), ServiceError> {
    let set = quests::get_or_generate_quest_set(db, user_id, telemetry.session_date).await?;
    let updates = quests::quest_updates_from_session(&set.quests, telemetry);

    let mut updated = Vec::with_capacity(updates.len());
    for update in updates {
        match quests::update_quest_progress(
            db,
            user_id,
            &update.quest_id,
            update.increment,
            Some(&update.reason),
            telemetry.session_date,
        )
        .await
        {
            Ok(quest) => updated.push(quest),
            // Another writer may have completed the quest in between.
            Err(ServiceError::Validation(message)) => {
                tracing::debug!(user_id, quest_id = %update.quest_id, message, "quest increment skipped");
            }
            Err(err) => return Err(err),
        }
    }

    let refreshed = quests::load_quest_set(db, user_id, telemetry.session_date).await?;
    Ok((updated, refreshed))
}

async fn detect_achievements(
    db: &Db,
    user_id: &str,
    session_id: &str,
    telemetry: &SessionTelemetry,
    result: &SessionResult,
) -> Result<Vec<Achievement>, ServiceError> {
    let total_sessions: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "practice_sessions" WHERE "userId" = ?"#,
    )
    .bind(user_id)
    .fetch_one(db.pool())
    .await?;

    let facts = SessionFacts {
        session_id: session_id.to_string(),
        mistake_count: telemetry.mistake_count,
        mistake_categories: telemetry.mistake_categories.clone(),
        streak: result.streak,
        total_sessions,
    };

    achievements::run_detection(db, user_id, &facts).await
}
