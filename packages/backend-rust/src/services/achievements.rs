//! Achievement and micro-win detection.
//!
//! Detection runs after each practice session, compares the session against
//! a short rolling history, and records at most one achievement per rule per
//! session. Ids are derived from the session id so a re-run of detection
//! for the same session inserts nothing new.

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sqlx::Row;

use crate::db::Db;
use crate::services::ServiceError;

const HISTORY_WINDOW: i64 = 10;
const ERROR_REDUCTION_LOOKBACK: usize = 3;
const CATEGORY_LOOKBACK: usize = 5;
const ACCURACY_THRESHOLD: f64 = 95.0;
const SESSION_MILESTONES: [i64; 7] = [5, 10, 25, 50, 100, 200, 500];
const LIST_LIMIT: i64 = 50;
const MICRO_WIN_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementType {
    Improvement,
    Milestone,
    Streak,
}

impl AchievementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AchievementType::Improvement => "improvement",
            AchievementType::Milestone => "milestone",
            AchievementType::Streak => "streak",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "milestone" => AchievementType::Milestone,
            "streak" => AchievementType::Streak,
            _ => AchievementType::Improvement,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    #[serde(rename = "type")]
    pub achievement_type: AchievementType,
    pub category: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub value: f64,
    pub previous_value: Option<f64>,
    pub percentage: Option<i64>,
    pub is_new: bool,
    pub earned_at: String,
}

/// Compact celebration card surfaced on the dashboard.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MicroWin {
    pub id: String,
    pub title: String,
    pub icon: String,
    pub value: f64,
    pub unit: String,
}

/// Everything detection needs to know about the session just recorded.
#[derive(Debug, Clone)]
pub struct SessionFacts {
    pub session_id: String,
    pub mistake_count: i64,
    pub mistake_categories: Vec<String>,
    pub streak: i64,
    pub total_sessions: i64,
}

/// One prior session, newest first in the history slice.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub mistake_count: i64,
    pub mistake_categories: Vec<String>,
}

pub fn accuracy_score(mistake_count: i64) -> f64 {
    (100.0 - 5.0 * mistake_count as f64).max(0.0)
}

/// Pure rule evaluation. `history` holds prior sessions only, newest first.
pub fn detect(facts: &SessionFacts, history: &[HistoryEntry]) -> Vec<Achievement> {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut found = Vec::new();

    if let Some(achievement) = detect_error_reduction(facts, history, &now) {
        found.push(achievement);
    }
    found.extend(detect_category_improvements(facts, history, &now));
    if let Some(achievement) = detect_accuracy_milestone(facts, history, &now) {
        found.push(achievement);
    }
    if let Some(achievement) = detect_streak_milestone(facts, &now) {
        found.push(achievement);
    }
    if let Some(achievement) = detect_session_milestone(facts, &now) {
        found.push(achievement);
    }

    found
}

fn detect_error_reduction(
    facts: &SessionFacts,
    history: &[HistoryEntry],
    now: &str,
) -> Option<Achievement> {
    if history.len() < ERROR_REDUCTION_LOOKBACK {
        return None;
    }
    let recent = &history[..ERROR_REDUCTION_LOOKBACK];
    let avg = recent.iter().map(|h| h.mistake_count as f64).sum::<f64>()
        / ERROR_REDUCTION_LOOKBACK as f64;
    if avg <= 0.0 || (facts.mistake_count as f64) >= avg * 0.7 {
        return None;
    }

    let percentage = ((avg - facts.mistake_count as f64) / avg * 100.0).round() as i64;
    Some(Achievement {
        id: format!("error_reduction_{}", facts.session_id),
        achievement_type: AchievementType::Improvement,
        category: "errors".to_string(),
        title: format!("{percentage}% Fewer Mistakes!"),
        description: format!(
            "You made {percentage}% fewer mistakes than your recent average"
        ),
        icon: "📉".to_string(),
        value: facts.mistake_count as f64,
        previous_value: Some(avg),
        percentage: Some(percentage),
        is_new: true,
        earned_at: now.to_string(),
    })
}

fn detect_category_improvements(
    facts: &SessionFacts,
    history: &[HistoryEntry],
    now: &str,
) -> Vec<Achievement> {
    let recent = &history[..history.len().min(CATEGORY_LOOKBACK)];

    // Count per-category occurrences in the lookback window.
    let mut totals: HashMap<&str, (i64, i64)> = HashMap::new();
    for entry in recent {
        let mut per_session: HashMap<&str, i64> = HashMap::new();
        for category in &entry.mistake_categories {
            *per_session.entry(category.as_str()).or_insert(0) += 1;
        }
        for (category, count) in per_session {
            let slot = totals.entry(category).or_insert((0, 0));
            slot.0 += count;
            slot.1 += 1;
        }
    }

    let mut current: HashMap<&str, i64> = HashMap::new();
    for category in &facts.mistake_categories {
        *current.entry(category.as_str()).or_insert(0) += 1;
    }

    let mut found = Vec::new();
    let mut categories: Vec<_> = totals.into_iter().collect();
    categories.sort_by_key(|(category, _)| *category);

    for (category, (total, sessions_seen)) in categories {
        if sessions_seen < ERROR_REDUCTION_LOOKBACK as i64 {
            continue;
        }
        let avg = total as f64 / sessions_seen as f64;
        let current_count = current.get(category).copied().unwrap_or(0) as f64;
        if current_count >= avg * 0.8 {
            continue;
        }

        let label = category.replace('_', " ");
        found.push(Achievement {
            id: format!("category_improvement_{}_{}", category, facts.session_id),
            achievement_type: AchievementType::Improvement,
            category: category.to_string(),
            title: format!("Better {label}!"),
            description: format!("Your {label} mistakes dropped below your recent average"),
            icon: "🎯".to_string(),
            value: current_count,
            previous_value: Some(avg),
            percentage: Some(((avg - current_count) / avg * 100.0).round() as i64),
            is_new: true,
            earned_at: now.to_string(),
        });
    }

    found
}

fn detect_accuracy_milestone(
    facts: &SessionFacts,
    history: &[HistoryEntry],
    now: &str,
) -> Option<Achievement> {
    let accuracy = accuracy_score(facts.mistake_count);
    if accuracy < ACCURACY_THRESHOLD {
        return None;
    }
    if !history.is_empty() {
        let avg = history
            .iter()
            .map(|h| accuracy_score(h.mistake_count))
            .sum::<f64>()
            / history.len() as f64;
        if accuracy <= avg {
            return None;
        }
    }

    Some(Achievement {
        id: format!("accuracy_milestone_{}", facts.session_id),
        achievement_type: AchievementType::Milestone,
        category: "accuracy".to_string(),
        title: "Precision Speaker!".to_string(),
        description: format!("You hit {accuracy:.0}% accuracy this session"),
        icon: "🎖️".to_string(),
        value: accuracy,
        previous_value: None,
        percentage: None,
        is_new: true,
        earned_at: now.to_string(),
    })
}

fn detect_streak_milestone(facts: &SessionFacts, now: &str) -> Option<Achievement> {
    if facts.streak <= 0 || facts.streak % 7 != 0 {
        return None;
    }
    let weeks = facts.streak / 7;
    Some(Achievement {
        id: format!("streak_milestone_{}_{}", facts.streak, facts.session_id),
        achievement_type: AchievementType::Streak,
        category: "streak".to_string(),
        title: format!("{}-Day Streak!", facts.streak),
        description: format!(
            "{weeks} full week{} of daily practice",
            if weeks == 1 { "" } else { "s" }
        ),
        icon: "🔥".to_string(),
        value: facts.streak as f64,
        previous_value: None,
        percentage: None,
        is_new: true,
        earned_at: now.to_string(),
    })
}

fn detect_session_milestone(facts: &SessionFacts, now: &str) -> Option<Achievement> {
    if !SESSION_MILESTONES.contains(&facts.total_sessions) {
        return None;
    }
    Some(Achievement {
        id: format!(
            "session_milestone_{}_{}",
            facts.total_sessions, facts.session_id
        ),
        achievement_type: AchievementType::Milestone,
        category: "sessions".to_string(),
        title: format!("{} Sessions Complete!", facts.total_sessions),
        description: format!(
            "You have finished {} practice sessions",
            facts.total_sessions
        ),
        icon: "🏆".to_string(),
        value: facts.total_sessions as f64,
        previous_value: None,
        percentage: None,
        is_new: true,
        earned_at: now.to_string(),
    })
}

/// Loads history, runs the rules, and stores whatever they produced. The
/// deterministic ids plus INSERT OR IGNORE make re-running detection for the
/// same session a no-op.
pub async fn run_detection(
    db: &Db,
    user_id: &str,
    facts: &SessionFacts,
) -> Result<Vec<Achievement>, ServiceError> {
    let history = load_history(db, user_id, &facts.session_id).await?;
    let detected = detect(facts, &history);

    for achievement in &detected {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO "achievements"
                ("id", "userId", "type", "category", "title", "description",
                 "icon", "value", "previousValue", "percentage", "isNew", "earnedAt")
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&achievement.id)
        .bind(user_id)
        .bind(achievement.achievement_type.as_str())
        .bind(&achievement.category)
        .bind(&achievement.title)
        .bind(&achievement.description)
        .bind(&achievement.icon)
        .bind(achievement.value)
        .bind(achievement.previous_value)
        .bind(achievement.percentage)
        .bind(&achievement.earned_at)
        .execute(db.pool())
        .await?;
    }

    if !detected.is_empty() {
        tracing::info!(user_id, count = detected.len(), "achievements detected");
    }

    Ok(detected)
}

async fn load_history(
    db: &Db,
    user_id: &str,
    exclude_session_id: &str,
) -> Result<Vec<HistoryEntry>, ServiceError> {
    let rows = sqlx::query(
        r#"
        SELECT "mistakeCount", "mistakeCategories"
        FROM "practice_sessions"
        WHERE "userId" = ? AND "id" != ?
        ORDER BY "createdAt" DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(exclude_session_id)
    .bind(HISTORY_WINDOW)
    .fetch_all(db.pool())
    .await?;

    let mut history = Vec::with_capacity(rows.len());
    for row in rows {
        let raw: String = row.try_get("mistakeCategories")?;
        history.push(HistoryEntry {
            mistake_count: row.try_get("mistakeCount")?,
            mistake_categories: serde_json::from_str(&raw).unwrap_or_default(),
        });
    }
    Ok(history)
}

pub async fn get_achievements(db: &Db, user_id: &str) -> Result<Vec<Achievement>, ServiceError> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "type", "category", "title", "description", "icon",
               "value", "previousValue", "percentage", "isNew", "earnedAt"
        FROM "achievements"
        WHERE "userId" = ?
        ORDER BY "earnedAt" DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(LIST_LIMIT)
    .fetch_all(db.pool())
    .await?;

    rows.iter()
        .map(achievement_from_row)
        .collect::<Result<Vec<_>, _>>()
        .map_err(ServiceError::from)
}

/// The three freshest unviewed achievements, reduced to celebration cards.
pub fn micro_wins(achievements: &[Achievement]) -> Vec<MicroWin> {
    achievements
        .iter()
        .filter(|a| a.is_new)
        .take(MICRO_WIN_LIMIT)
        .map(|a| MicroWin {
            id: a.id.clone(),
            title: a.title.clone(),
            icon: a.icon.clone(),
            value: a.percentage.map(|p| p as f64).unwrap_or(a.value),
            unit: match a.achievement_type {
                AchievementType::Improvement => "%".to_string(),
                AchievementType::Streak => "days".to_string(),
                AchievementType::Milestone => {
                    if a.category == "accuracy" {
                        "%".to_string()
                    } else {
                        "sessions".to_string()
                    }
                }
            },
        })
        .collect()
}

/// Picks the single achievement worth the loudest celebration. Streaks beat
/// milestones beat improvements.
pub fn most_impressive(achievements: &[Achievement]) -> Option<Achievement> {
    let new: Vec<_> = achievements.iter().filter(|a| a.is_new).collect();
    if new.is_empty() {
        return None;
    }

    let rank = |a: &Achievement| match a.achievement_type {
        AchievementType::Streak => 0,
        AchievementType::Milestone => {
            if a.category == "accuracy" {
                2
            } else {
                1
            }
        }
        AchievementType::Improvement => 3,
    };

    new.iter()
        .min_by_key(|a| rank(a))
        .map(|a| (*a).clone())
        .or_else(|| new.first().map(|a| (*a).clone()))
}

/// Marks one achievement as viewed. Idempotent once it exists.
pub async fn mark_viewed(db: &Db, user_id: &str, achievement_id: &str) -> Result<(), ServiceError> {
    let exists: Option<String> = sqlx::query_scalar(
        r#"SELECT "id" FROM "achievements" WHERE "id" = ? AND "userId" = ?"#,
    )
    .bind(achievement_id)
    .bind(user_id)
    .fetch_optional(db.pool())
    .await?;

    if exists.is_none() {
        return Err(ServiceError::NotFound("achievement not found".to_string()));
    }

    sqlx::query(r#"UPDATE "achievements" SET "isNew" = 0 WHERE "id" = ? AND "userId" = ?"#)
        .bind(achievement_id)
        .bind(user_id)
        .execute(db.pool())
        .await?;

    Ok(())
}

fn achievement_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Achievement, sqlx::Error> {
    let achievement_type: String = row.try_get("type")?;
    let is_new: i64 = row.try_get("isNew")?;

    Ok(Achievement {
        id: row.try_get("id")?,
        achievement_type: AchievementType::parse(&achievement_type),
        category: row.try_get("category")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        icon: row.try_get("icon")?,
        value: row.try_get("value")?,
        previous_value: row.try_get("previousValue")?,
        percentage: row.try_get("percentage")?,
        is_new: is_new != 0,
        earned_at: row.try_get("earnedAt")?,
    })
}
