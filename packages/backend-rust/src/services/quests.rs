//! Daily quest engine.
//!
//! Generates exactly three quests per user per calendar day (warmup,
//! mistake review, vocabulary), tracks bounded monotonic progress toward
//! each, and evaluates streak-shield eligibility the moment the whole set
//! first completes. Generation is keyed by (user, date) and never repeated;
//! template choice is randomized but seeded from the same key so a retried
//! generation produces the identical set.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use chrono::{NaiveDate, SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use crate::db::Db;
use crate::services::progress::SessionTelemetry;
use crate::services::ServiceError;

const DEFAULT_MISTAKE_CATEGORY: &str = "articles";
const RECENT_SESSIONS_FOR_CATEGORY: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestType {
    Warmup,
    MistakeReview,
    Vocabulary,
}

impl QuestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestType::Warmup => "warmup",
            QuestType::MistakeReview => "mistake_review",
            QuestType::Vocabulary => "vocabulary",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "mistake_review" => QuestType::MistakeReview,
            "vocabulary" => QuestType::Vocabulary,
            _ => QuestType::Warmup,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "medium" => Difficulty::Medium,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Easy,
        }
    }

    /// Tier for a user level: 1-3 easy, 4-10 medium, above that hard.
    pub fn for_level(level: i64) -> Self {
        if level <= 3 {
            Difficulty::Easy
        } else if level <= 10 {
            Difficulty::Medium
        } else {
            Difficulty::Hard
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    #[serde(rename = "type")]
    pub quest_type: QuestType,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub category: Option<String>,
    pub target: i64,
    pub progress: i64,
    pub completed: bool,
    pub xp_reward: i64,
    pub difficulty: Difficulty,
    pub estimated_minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestSet {
    pub date: NaiveDate,
    pub quests: Vec<Quest>,
    pub all_completed: bool,
    pub streak_shield_earned: bool,
    pub total_xp_available: i64,
    pub total_xp_earned: i64,
}

#[derive(Debug, Clone)]
pub struct QuestProgressUpdate {
    pub quest_id: String,
    pub increment: i64,
    pub reason: String,
}

/// Returns the quest set for `date`, generating it on first access. The
/// insert is guarded by the (user, date) primary key, so a concurrent
/// generation race resolves to a single stored set.
pub async fn get_or_generate_quest_set(
    db: &Db,
    user_id: &str,
    date: NaiveDate,
) -> Result<QuestSet, ServiceError> {
    if let Some(set) = load_quest_set(db, user_id, date).await? {
        if !set.quests.is_empty() {
            return Ok(set);
        }
    }

    let level: i64 = sqlx::query_scalar(
        r#"SELECT "currentLevel" FROM "user_progress" WHERE "userId" = ?"#,
    )
    .bind(user_id)
    .fetch_optional(db.pool())
    .await?
    .unwrap_or(1);

    let top_category = most_frequent_mistake_category(db, user_id).await?;
    let quests = generate_quests(user_id, date, level, &top_category);

    // Set row and quest rows land in one transaction: a reader can never see
    // a claimed date with fewer than three quests, and an interrupted
    // generation leaves nothing behind. The quest count is re-checked inside
    // the transaction so a set row without quests is backfilled.
    let mut tx = db.pool().begin().await?;

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    sqlx::query(
        r#"INSERT OR IGNORE INTO "quest_sets" ("userId", "date", "createdAt") VALUES (?, ?, ?)"#,
    )
    .bind(user_id)
    .bind(date.to_string())
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    let existing: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "quests" WHERE "userId" = ? AND "date" = ?"#,
    )
    .bind(user_id)
    .bind(date.to_string())
    .fetch_one(&mut *tx)
    .await?;

    if existing == 0 {
        for (position, quest) in quests.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO "quests"
                    ("id", "userId", "date", "type", "title", "description", "icon",
                     "category", "target", "progress", "completed", "xpReward",
                     "difficulty", "estimatedMinutes", "position")
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?, ?, ?)
                "#,
            )
            .bind(&quest.id)
            .bind(user_id)
            .bind(date.to_string())
            .bind(quest.quest_type.as_str())
            .bind(&quest.title)
            .bind(&quest.description)
            .bind(&quest.icon)
            .bind(&quest.category)
            .bind(quest.target)
            .bind(quest.xp_reward)
            .bind(quest.difficulty.as_str())
            .bind(quest.estimated_minutes)
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    load_quest_set(db, user_id, date)
        .await?
        .ok_or_else(|| ServiceError::NotFound("quest set not found after generation".to_string()))
}

/// Applies a bounded increment to one quest in the caller's set for `today`.
/// Completed quests and quests from other days are rejected without
/// mutation. Progress never exceeds the target and never decreases.
pub async fn update_quest_progress(
    db: &Db,
    user_id: &str,
    quest_id: &str,
    increment: i64,
    reason: Option<&str>,
    today: NaiveDate,
) -> Result<Quest, ServiceError> {
    if increment <= 0 {
        return Err(ServiceError::Validation(
            "increment must be positive".to_string(),
        ));
    }

    let mut tx = db.pool().begin().await?;

    let row = sqlx::query(
        r#"SELECT "date", "completed" FROM "quests" WHERE "id" = ? AND "userId" = ?"#,
    )
    .bind(quest_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(row) = row else {
        return Err(ServiceError::NotFound("quest not found".to_string()));
    };

    let quest_date: String = row.try_get("date")?;
    if quest_date != today.to_string() {
        return Err(ServiceError::Validation(
            "quest is not part of today's set".to_string(),
        ));
    }
    let already_completed: i64 = row.try_get("completed")?;
    if already_completed != 0 {
        return Err(ServiceError::Validation(
            "quest already completed".to_string(),
        ));
    }

    // Capped increment computed inside the statement: concurrent updates
    // serialize on the row and can never push progress past the target.
    sqlx::query(
        r#"
        UPDATE "quests"
        SET "progress" = MIN("progress" + ?, "target"),
            "completed" = CASE WHEN "progress" + ? >= "target" THEN 1 ELSE 0 END
        WHERE "id" = ? AND "completed" = 0
        "#,
    )
    .bind(increment)
    .bind(increment)
    .bind(quest_id)
    .execute(&mut *tx)
    .await?;

    let row = sqlx::query(
        r#"
        SELECT "id", "type", "title", "description", "icon", "category",
               "target", "progress", "completed", "xpReward", "difficulty",
               "estimatedMinutes"
        FROM "quests"
        WHERE "id" = ?
        "#,
    )
    .bind(quest_id)
    .fetch_one(&mut *tx)
    .await?;
    let quest = quest_from_row(&row)?;

    if quest.completed {
        finalize_set_if_complete(&mut tx, user_id, today).await?;
    }

    tx.commit().await?;

    tracing::info!(
        user_id,
        quest_id,
        increment,
        progress = quest.progress,
        completed = quest.completed,
        reason = reason.unwrap_or(""),
        "quest progress updated"
    );

    Ok(quest)
}

/// Translates session telemetry into progress increments for the open quests
/// of the set. Pure; persistence is the caller's concern.
pub fn quest_updates_from_session(
    quests: &[Quest],
    telemetry: &SessionTelemetry,
) -> Vec<QuestProgressUpdate> {
    let mut updates = Vec::new();

    for quest in quests {
        if quest.completed {
            continue;
        }

        match quest.quest_type {
            QuestType::Warmup => {
                if quest.title.contains("Minute") {
                    let minutes = (telemetry.duration_seconds / 60.0).floor() as i64;
                    if minutes > 0 {
                        updates.push(QuestProgressUpdate {
                            quest_id: quest.id.clone(),
                            increment: minutes,
                            reason: format!(
                                "Spoke for {minutes} minute{}",
                                if minutes == 1 { "" } else { "s" }
                            ),
                        });
                    }
                } else if quest.title.contains("Sentence") {
                    let sentences = telemetry.words_spoken / 10;
                    if sentences > 0 {
                        updates.push(QuestProgressUpdate {
                            quest_id: quest.id.clone(),
                            increment: sentences,
                            reason: format!(
                                "Completed {sentences} sentence{}",
                                if sentences == 1 { "" } else { "s" }
                            ),
                        });
                    }
                } else {
                    let seconds = telemetry.duration_seconds.floor() as i64;
                    if seconds > 0 {
                        updates.push(QuestProgressUpdate {
                            quest_id: quest.id.clone(),
                            increment: seconds,
                            reason: format!("{seconds} seconds of speaking"),
                        });
                    }
                }
            }
            QuestType::MistakeReview => {
                let category_matches = quest
                    .category
                    .as_deref()
                    .map(|category| {
                        telemetry
                            .mistake_categories
                            .iter()
                            .filter(|c| c.as_str() == category)
                            .count() as i64
                    })
                    .unwrap_or(0);
                let improvement = (quest.target - category_matches).max(0);
                if improvement > 0 {
                    let label = quest
                        .category
                        .as_deref()
                        .unwrap_or("grammar")
                        .replace('_', " ");
                    updates.push(QuestProgressUpdate {
                        quest_id: quest.id.clone(),
                        increment: improvement,
                        reason: format!("Improved {label} accuracy"),
                    });
                }
            }
            QuestType::Vocabulary => {
                let bonus = telemetry.words_spoken / 20;
                if bonus > 0 {
                    let room = (quest.target - quest.progress).max(0);
                    let increment = bonus.min(room);
                    if increment > 0 {
                        updates.push(QuestProgressUpdate {
                            quest_id: quest.id.clone(),
                            increment,
                            reason: format!(
                                "Used varied vocabulary ({} words)",
                                telemetry.words_spoken
                            ),
                        });
                    }
                }
            }
        }
    }

    updates
}

async fn finalize_set_if_complete(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: &str,
    date: NaiveDate,
) -> Result<(), ServiceError> {
    let open: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "quests" WHERE "userId" = ? AND "date" = ? AND "completed" = 0"#,
    )
    .bind(user_id)
    .bind(date.to_string())
    .fetch_one(&mut **tx)
    .await?;
    if open > 0 {
        return Ok(());
    }

    let already_finalized: Option<String> = sqlx::query_scalar(
        r#"SELECT "allCompletedAt" FROM "quest_sets" WHERE "userId" = ? AND "date" = ?"#,
    )
    .bind(user_id)
    .bind(date.to_string())
    .fetch_optional(&mut **tx)
    .await?
    .flatten();
    if already_finalized.is_some() {
        return Ok(());
    }

    let streak: i64 = sqlx::query_scalar(
        r#"SELECT "streak" FROM "user_progress" WHERE "userId" = ?"#,
    )
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?
    .unwrap_or(0);

    let shield = streak > 0 && streak % 7 == 0;
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    sqlx::query(
        r#"
        UPDATE "quest_sets"
        SET "allCompletedAt" = ?, "streakShieldEarned" = ?
        WHERE "userId" = ? AND "date" = ? AND "allCompletedAt" IS NULL
        "#,
    )
    .bind(&now)
    .bind(shield as i64)
    .bind(user_id)
    .bind(date.to_string())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn load_quest_set(
    db: &Db,
    user_id: &str,
    date: NaiveDate,
) -> Result<Option<QuestSet>, ServiceError> {
    let set_row = sqlx::query(
        r#"SELECT "streakShieldEarned" FROM "quest_sets" WHERE "userId" = ? AND "date" = ?"#,
    )
    .bind(user_id)
    .bind(date.to_string())
    .fetch_optional(db.pool())
    .await?;

    let Some(set_row) = set_row else {
        return Ok(None);
    };
    let shield: i64 = set_row.try_get("streakShieldEarned")?;

    let rows = sqlx::query(
        r#"
        SELECT "id", "type", "title", "description", "icon", "category",
               "target", "progress", "completed", "xpReward", "difficulty",
               "estimatedMinutes"
        FROM "quests"
        WHERE "userId" = ? AND "date" = ?
        ORDER BY "position" ASC
        "#,
    )
    .bind(user_id)
    .bind(date.to_string())
    .fetch_all(db.pool())
    .await?;

    let quests = rows
        .iter()
        .map(quest_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(assemble_quest_set(date, quests, shield != 0)))
}

fn assemble_quest_set(date: NaiveDate, quests: Vec<Quest>, shield: bool) -> QuestSet {
    let all_completed = !quests.is_empty() && quests.iter().all(|q| q.completed);
    let total_xp_available = quests.iter().map(|q| q.xp_reward).sum();
    let total_xp_earned = quests
        .iter()
        .filter(|q| q.completed)
        .map(|q| q.xp_reward)
        .sum();

    QuestSet {
        date,
        quests,
        all_completed,
        streak_shield_earned: shield,
        total_xp_available,
        total_xp_earned,
    }
}

fn quest_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Quest, sqlx::Error> {
    let quest_type: String = row.try_get("type")?;
    let difficulty: String = row.try_get("difficulty")?;
    let completed: i64 = row.try_get("completed")?;

    Ok(Quest {
        id: row.try_get("id")?,
        quest_type: QuestType::parse(&quest_type),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        icon: row.try_get("icon")?,
        category: row.try_get("category")?,
        target: row.try_get("target")?,
        progress: row.try_get("progress")?,
        completed: completed != 0,
        xp_reward: row.try_get("xpReward")?,
        difficulty: Difficulty::parse(&difficulty),
        estimated_minutes: row.try_get("estimatedMinutes")?,
    })
}

async fn most_frequent_mistake_category(
    db: &Db,
    user_id: &str,
) -> Result<String, ServiceError> {
    let rows = sqlx::query(
        r#"
        SELECT "mistakeCategories"
        FROM "practice_sessions"
        WHERE "userId" = ?
        ORDER BY "createdAt" DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(RECENT_SESSIONS_FOR_CATEGORY)
    .fetch_all(db.pool())
    .await?;

    let mut counts: HashMap<String, i64> = HashMap::new();
    for row in rows {
        let raw: String = row.try_get("mistakeCategories")?;
        let categories: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
        for category in categories {
            *counts.entry(category).or_insert(0) += 1;
        }
    }

    Ok(counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .map(|(category, _)| category)
        .unwrap_or_else(|| DEFAULT_MISTAKE_CATEGORY.to_string()))
}

/// Deterministic seed for template selection: the same user and date always
/// roll the same templates.
fn generation_seed(user_id: &str, date: NaiveDate) -> u64 {
    let mut hasher = DefaultHasher::new();
    user_id.hash(&mut hasher);
    date.to_string().hash(&mut hasher);
    hasher.finish()
}

/// Builds the three quests for the day: one warmup, one mistake review, one
/// vocabulary challenge, in that order.
pub fn generate_quests(
    user_id: &str,
    date: NaiveDate,
    level: i64,
    top_mistake_category: &str,
) -> Vec<Quest> {
    let mut rng = StdRng::seed_from_u64(generation_seed(user_id, date));
    let difficulty = Difficulty::for_level(level);

    vec![
        warmup_quest(&mut rng, difficulty),
        mistake_review_quest(&mut rng, difficulty, top_mistake_category),
        vocabulary_quest(&mut rng, difficulty, level),
    ]
}

fn warmup_quest(rng: &mut StdRng, difficulty: Difficulty) -> Quest {
    let base = match difficulty {
        Difficulty::Easy => 2,
        Difficulty::Medium => 3,
        Difficulty::Hard => 4,
    };

    let (title, description, target, xp_reward, estimated_minutes) =
        match rng.random_range(0..3) {
            0 => (
                format!("{base}-Minute Speaking Warm-up"),
                format!("Get your voice ready with a quick {base}-minute speaking session"),
                base * 60,
                15,
                base,
            ),
            1 => (
                format!("Quick {base} Sentence Practice"),
                format!("Speak {base} complete sentences to warm up your English"),
                base,
                12,
                2,
            ),
            _ => (
                format!("{} Second Voice Check", base * 30),
                "Quick pronunciation practice to start your day strong".to_string(),
                base * 30,
                10,
                1,
            ),
        };

    Quest {
        id: format!("warmup_{}", Uuid::new_v4()),
        quest_type: QuestType::Warmup,
        title,
        description,
        icon: "🌅".to_string(),
        category: Some("general".to_string()),
        target,
        progress: 0,
        completed: false,
        xp_reward,
        difficulty,
        estimated_minutes,
    }
}

fn mistake_review_quest(rng: &mut StdRng, difficulty: Difficulty, category: &str) -> Quest {
    let info = mistake_category_info(category);
    let (target, xp_reward) = match difficulty {
        Difficulty::Easy => (3, 20),
        Difficulty::Medium => (5, 25),
        Difficulty::Hard => (7, 30),
    };

    let (title, description, estimated_minutes) = match rng.random_range(0..3) {
        0 => (
            format!("Fix {target} {} Errors", info.name),
            format!(
                "Practice avoiding {} mistakes in your speech",
                info.name.to_lowercase()
            ),
            3,
        ),
        1 => (
            format!("{} Challenge", info.name),
            format!(
                "Focus on {} - speak {target} error-free sentences",
                info.description.to_lowercase()
            ),
            4,
        ),
        _ => (
            format!("Master {}", info.name),
            format!(
                "Demonstrate improvement in {} with {target} practice rounds",
                info.name.to_lowercase()
            ),
            5,
        ),
    };

    Quest {
        id: format!("mistake_{}_{}", category, Uuid::new_v4()),
        quest_type: QuestType::MistakeReview,
        title,
        description,
        icon: info.icon.to_string(),
        category: Some(category.to_string()),
        target,
        progress: 0,
        completed: false,
        xp_reward,
        difficulty,
        estimated_minutes,
    }
}

fn vocabulary_quest(rng: &mut StdRng, difficulty: Difficulty, level: i64) -> Quest {
    let themes: &[(&str, &str)] = if level <= 5 {
        &[
            ("food verbs", "🍽️"),
            ("daily actions", "📅"),
            ("family terms", "👨‍👩‍👧‍👦"),
        ]
    } else if level <= 15 {
        &[
            ("business terms", "💼"),
            ("emotions", "😊"),
            ("technology", "💻"),
        ]
    } else {
        &[
            ("academic writing", "📚"),
            ("professional skills", "🎯"),
            ("nuanced expressions", "🎭"),
        ]
    };

    let (theme, icon) = themes[rng.random_range(0..themes.len())];
    let (target, xp_reward) = match difficulty {
        Difficulty::Easy => (3, 18),
        Difficulty::Medium => (4, 22),
        Difficulty::Hard => (5, 28),
    };

    let (title, description, estimated_minutes) = match rng.random_range(0..3) {
        0 => (
            format!("Learn {target} {theme}"),
            format!("Practice using {target} new words related to {theme} in sentences"),
            4,
        ),
        1 => (
            format!("{} Mastery", capitalize(theme)),
            format!("Use {target} {theme} correctly in your speaking practice"),
            5,
        ),
        _ => (
            format!("Expand Your {theme} Vocabulary"),
            format!("Demonstrate fluency with {target} {theme} in conversation"),
            6,
        ),
    };

    Quest {
        id: format!("vocabulary_{}_{}", theme.replace(' ', "_"), Uuid::new_v4()),
        quest_type: QuestType::Vocabulary,
        title,
        description,
        icon: icon.to_string(),
        category: Some(theme.to_string()),
        target,
        progress: 0,
        completed: false,
        xp_reward,
        difficulty,
        estimated_minutes,
    }
}

struct MistakeCategoryInfo {
    name: &'static str,
    description: &'static str,
    icon: &'static str,
}

fn mistake_category_info(category: &str) -> MistakeCategoryInfo {
    match category {
        "verb_tense" => MistakeCategoryInfo {
            name: "Verb Tenses",
            description: "Perfect your past, present, and future tenses",
            icon: "⏰",
        },
        "prepositions" => MistakeCategoryInfo {
            name: "Prepositions",
            description: "Navigate in, on, at, by, for, and more",
            icon: "🔗",
        },
        "subject_verb_agreement" => MistakeCategoryInfo {
            name: "Subject-Verb Agreement",
            description: "Ensure subjects and verbs work together",
            icon: "🤝",
        },
        "word_order" => MistakeCategoryInfo {
            name: "Sentence Structure",
            description: "Build clear, well-organized sentences",
            icon: "🔄",
        },
        "pluralization" => MistakeCategoryInfo {
            name: "Plural Forms",
            description: "Handle singular and plural nouns correctly",
            icon: "📊",
        },
        "pronouns" => MistakeCategoryInfo {
            name: "Pronoun Usage",
            description: "Use he, she, it, they, and possessives correctly",
            icon: "👤",
        },
        "run_on_fragment" => MistakeCategoryInfo {
            name: "Sentence Flow",
            description: "Create complete, well-connected sentences",
            icon: "✂️",
        },
        "filler_words" => MistakeCategoryInfo {
            name: "Speaking Fluency",
            description: "Reduce \"um\", \"uh\", and hesitation words",
            icon: "🤐",
        },
        _ => MistakeCategoryInfo {
            name: "Article Usage",
            description: "Master when to use \"a\", \"an\", and \"the\"",
            icon: "📰",
        },
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
