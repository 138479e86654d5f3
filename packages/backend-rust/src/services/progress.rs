//! Session progress updater.
//!
//! Applies one completed practice session to the user's persisted progress
//! record: XP award, level recompute, streak transition and daily-goal
//! counting happen in a single transaction so concurrent submissions cannot
//! observe or produce a partial update.

use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use fluenta_algo::{level_for_xp, session_xp, xp_progress};

use crate::db::Db;
use crate::services::ServiceError;

/// What happens to a streak when the user skipped one calendar day.
/// `Strict` always resets; `ShieldGrace` forgives a single missed day when
/// the last active day's quest set earned a streak shield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakPolicy {
    Strict,
    ShieldGrace,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyGoal {
    pub target: i64,
    pub completed: i64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub current_xp: i64,
    pub current_level: i64,
    pub xp_in_current_level: i64,
    pub xp_needed_for_next: i64,
    pub xp_until_next: i64,
    pub progress_percentage: f64,
    pub streak: i64,
    pub longest_streak: i64,
    pub last_activity_date: Option<NaiveDate>,
    pub daily_goal: DailyGoal,
}

/// Field names follow the wire contract consumed by the client.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResult {
    pub xp_earned: i64,
    pub total_xp: i64,
    pub level: i64,
    pub level_up: bool,
    pub streak: i64,
}

#[derive(Debug, Clone)]
pub struct SessionTelemetry {
    pub duration_seconds: f64,
    pub mistake_count: i64,
    pub mistake_categories: Vec<String>,
    pub words_spoken: i64,
    pub session_date: NaiveDate,
}

impl SessionTelemetry {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if !self.duration_seconds.is_finite() || self.duration_seconds < 0.0 {
            return Err(ServiceError::Validation(
                "duration_seconds must be a non-negative number".to_string(),
            ));
        }
        if self.mistake_count < 0 {
            return Err(ServiceError::Validation(
                "mistake_count must be a non-negative integer".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the user's progress record, creating the default one on first
/// access. The daily-goal counter is reported as zero whenever the stored
/// goal day is not `today`.
pub async fn get_or_create_progress(
    db: &Db,
    user_id: &str,
    today: NaiveDate,
) -> Result<UserProgress, ServiceError> {
    ensure_progress_row(db, user_id).await?;

    let row = sqlx::query(
        r#"
        SELECT "currentXp", "currentLevel", "streak", "longestStreak",
               "lastActivityDate", "dailyGoalTarget", "dailyGoalCompleted",
               "dailyGoalUnit", "dailyGoalDate"
        FROM "user_progress"
        WHERE "userId" = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(db.pool())
    .await?;

    Ok(progress_from_row(&row, today)?)
}

/// Persists the raw session telemetry. Kept separate from the progress
/// transaction: a progress failure must not un-record the session.
pub async fn record_practice_session(
    db: &Db,
    user_id: &str,
    telemetry: &SessionTelemetry,
) -> Result<String, ServiceError> {
    telemetry.validate()?;

    let id = Uuid::new_v4().to_string();
    let categories = serde_json::to_string(&telemetry.mistake_categories)
        .map_err(|e| ServiceError::Validation(format!("invalid mistake_categories: {e}")))?;
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    sqlx::query(
        r#"
        INSERT INTO "practice_sessions"
            ("id", "userId", "sessionDate", "durationSeconds", "mistakeCount",
             "mistakeCategories", "wordsSpoken", "createdAt")
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(telemetry.session_date.to_string())
    .bind(telemetry.duration_seconds)
    .bind(telemetry.mistake_count)
    .bind(&categories)
    .bind(telemetry.words_spoken)
    .bind(&now)
    .execute(db.pool())
    .await?;

    Ok(id)
}

/// Applies one session to the progress record and reports the outcome.
/// Everything is computed against the row as read inside the transaction, so
/// two concurrent sessions both land (neither XP award is lost).
pub async fn apply_session(
    db: &Db,
    user_id: &str,
    telemetry: &SessionTelemetry,
    policy: StreakPolicy,
) -> Result<SessionResult, ServiceError> {
    telemetry.validate()?;
    ensure_progress_row(db, user_id).await?;

    let mut tx = db.pool().begin().await?;

    let row = sqlx::query(
        r#"
        SELECT "currentXp", "currentLevel", "streak", "longestStreak",
               "lastActivityDate", "dailyGoalCompleted", "dailyGoalDate"
        FROM "user_progress"
        WHERE "userId" = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    let current_xp: i64 = row.try_get("currentXp")?;
    let current_level: i64 = row.try_get("currentLevel")?;
    let streak: i64 = row.try_get("streak")?;
    let longest_streak: i64 = row.try_get("longestStreak")?;
    let last_activity = parse_opt_date(row.try_get::<Option<String>, _>("lastActivityDate")?);
    let goal_completed: i64 = row.try_get("dailyGoalCompleted")?;
    let goal_date = parse_opt_date(row.try_get::<Option<String>, _>("dailyGoalDate")?);

    let xp_earned = session_xp(telemetry.duration_seconds, telemetry.mistake_count);
    let total_xp = current_xp + xp_earned;
    let new_level = level_for_xp(total_xp);
    let level_up = new_level > current_level;

    let shield_available = if policy == StreakPolicy::ShieldGrace {
        match last_activity {
            Some(date) => shield_available_for(&mut tx, user_id, date).await?,
            None => false,
        }
    } else {
        false
    };

    let transition = next_streak(
        streak,
        last_activity,
        telemetry.session_date,
        shield_available,
        policy,
    );
    let new_streak = transition.streak;
    let new_longest = longest_streak.max(new_streak);

    if transition.shield_consumed {
        if let Some(date) = last_activity {
            sqlx::query(
                r#"UPDATE "quest_sets" SET "shieldUsed" = 1 WHERE "userId" = ? AND "date" = ?"#,
            )
            .bind(user_id)
            .bind(date.to_string())
            .execute(&mut *tx)
            .await?;
        }
    }

    // Dates only roll forward: a backdated session never clobbers the
    // current activity day or the goal counter already accrued for it.
    let new_last_activity = match last_activity {
        Some(last) if last > telemetry.session_date => last,
        _ => telemetry.session_date,
    };
    let (new_goal_completed, new_goal_date) = match goal_date {
        Some(date) if date == telemetry.session_date => (goal_completed + 1, date),
        Some(date) if date > telemetry.session_date => (goal_completed, date),
        _ => (1, telemetry.session_date),
    };

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    sqlx::query(
        r#"
        UPDATE "user_progress"
        SET "currentXp" = ?,
            "currentLevel" = ?,
            "streak" = ?,
            "longestStreak" = ?,
            "lastActivityDate" = ?,
            "dailyGoalCompleted" = ?,
            "dailyGoalDate" = ?,
            "updatedAt" = ?
        WHERE "userId" = ?
        "#,
    )
    .bind(total_xp)
    .bind(new_level)
    .bind(new_streak)
    .bind(new_longest)
    .bind(new_last_activity.to_string())
    .bind(new_goal_completed)
    .bind(new_goal_date.to_string())
    .bind(&now)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(SessionResult {
        xp_earned,
        total_xp,
        level: new_level,
        level_up,
        streak: new_streak,
    })
}

/// Updates the daily-goal configuration and returns the fresh record.
pub async fn set_daily_goal(
    db: &Db,
    user_id: &str,
    target: Option<i64>,
    unit: Option<String>,
    today: NaiveDate,
) -> Result<UserProgress, ServiceError> {
    let unit = unit.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());

    if target.is_none() && unit.is_none() {
        return Err(ServiceError::Validation(
            "no valid updates provided".to_string(),
        ));
    }
    if let Some(target) = target {
        if target <= 0 {
            return Err(ServiceError::Validation(
                "daily_goal_target must be positive".to_string(),
            ));
        }
    }

    ensure_progress_row(db, user_id).await?;

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    sqlx::query(
        r#"
        UPDATE "user_progress"
        SET "dailyGoalTarget" = COALESCE(?, "dailyGoalTarget"),
            "dailyGoalUnit" = COALESCE(?, "dailyGoalUnit"),
            "updatedAt" = ?
        WHERE "userId" = ?
        "#,
    )
    .bind(target)
    .bind(unit)
    .bind(&now)
    .bind(user_id)
    .execute(db.pool())
    .await?;

    get_or_create_progress(db, user_id, today).await
}

async fn ensure_progress_row(db: &Db, user_id: &str) -> Result<(), ServiceError> {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    sqlx::query(
        r#"INSERT OR IGNORE INTO "user_progress" ("userId", "updatedAt") VALUES (?, ?)"#,
    )
    .bind(user_id)
    .bind(&now)
    .execute(db.pool())
    .await?;
    Ok(())
}

async fn shield_available_for(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &str,
    date: NaiveDate,
) -> Result<bool, ServiceError> {
    let row = sqlx::query(
        r#"SELECT "streakShieldEarned", "shieldUsed" FROM "quest_sets" WHERE "userId" = ? AND "date" = ?"#,
    )
    .bind(user_id)
    .bind(date.to_string())
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row
        .map(|r| {
            let earned: i64 = r.try_get("streakShieldEarned").unwrap_or(0);
            let used: i64 = r.try_get("shieldUsed").unwrap_or(0);
            earned != 0 && used == 0
        })
        .unwrap_or(false))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StreakTransition {
    streak: i64,
    shield_consumed: bool,
}

/// Streak continuation rules. Same calendar day leaves the streak untouched,
/// the next day extends it, a longer gap resets to 1 unless an unused shield
/// covers exactly one missed day under the grace policy.
fn next_streak(
    current: i64,
    last_activity: Option<NaiveDate>,
    session_date: NaiveDate,
    shield_available: bool,
    policy: StreakPolicy,
) -> StreakTransition {
    let Some(last) = last_activity else {
        return StreakTransition {
            streak: 1,
            shield_consumed: false,
        };
    };

    let gap = (session_date - last).num_days();
    if gap <= 0 {
        // Same day, or a backdated submission: never decrement.
        return StreakTransition {
            streak: current.max(1),
            shield_consumed: false,
        };
    }
    if gap == 1 {
        return StreakTransition {
            streak: current + 1,
            shield_consumed: false,
        };
    }
    if policy == StreakPolicy::ShieldGrace && gap == 2 && shield_available {
        return StreakTransition {
            streak: current + 1,
            shield_consumed: true,
        };
    }

    StreakTransition {
        streak: 1,
        shield_consumed: false,
    }
}

fn parse_opt_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

fn progress_from_row(row: &sqlx::sqlite::SqliteRow, today: NaiveDate) -> Result<UserProgress, sqlx::Error> {
    let current_xp: i64 = row.try_get("currentXp")?;
    let current_level: i64 = row.try_get("currentLevel")?;
    let streak: i64 = row.try_get("streak")?;
    let longest_streak: i64 = row.try_get("longestStreak")?;
    let last_activity_date = parse_opt_date(row.try_get::<Option<String>, _>("lastActivityDate")?);
    let goal_target: i64 = row.try_get("dailyGoalTarget")?;
    let goal_completed: i64 = row.try_get("dailyGoalCompleted")?;
    let goal_unit: String = row.try_get("dailyGoalUnit")?;
    let goal_date = parse_opt_date(row.try_get::<Option<String>, _>("dailyGoalDate")?);

    let position = xp_progress(current_xp, current_level);

    Ok(UserProgress {
        current_xp,
        current_level,
        xp_in_current_level: position.xp_in_current_level,
        xp_needed_for_next: position.xp_needed_for_next,
        xp_until_next: position.xp_until_next,
        progress_percentage: position.progress_percentage,
        streak,
        longest_streak,
        last_activity_date,
        daily_goal: DailyGoal {
            target: goal_target,
            completed: if goal_date == Some(today) {
                goal_completed
            } else {
                0
            },
            unit: goal_unit,
        },
    })
}
