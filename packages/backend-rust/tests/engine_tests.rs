use chrono::{Duration, NaiveDate, Utc};

use fluenta_backend_rust::services::achievements::{self, SessionFacts};
use fluenta_backend_rust::services::progress::{
    self, SessionTelemetry, StreakPolicy,
};
use fluenta_backend_rust::services::quests::{self, QuestType};
use fluenta_backend_rust::services::ServiceError;

mod common;

fn telemetry(date: NaiveDate, duration: f64, mistakes: i64) -> SessionTelemetry {
    SessionTelemetry {
        duration_seconds: duration,
        mistake_count: mistakes,
        mistake_categories: Vec::new(),
        words_spoken: 0,
        session_date: date,
    }
}

#[tokio::test]
async fn test_first_session_awards_xp_and_starts_streak() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();

    let result = progress::apply_session(
        &db,
        "u1",
        &telemetry(today, 180.0, 0),
        StreakPolicy::Strict,
    )
    .await
    .unwrap();

    // 10 base + 3 minutes * 2 + 20 accuracy bonus
    assert_eq!(result.xp_earned, 36);
    assert_eq!(result.total_xp, 36);
    assert_eq!(result.level, 1);
    assert!(!result.level_up);
    assert_eq!(result.streak, 1);

    let record = progress::get_or_create_progress(&db, "u1", today)
        .await
        .unwrap();
    assert_eq!(record.current_xp, 36);
    assert_eq!(record.streak, 1);
    assert_eq!(record.daily_goal.completed, 1);
}

#[tokio::test]
async fn test_level_up_when_crossing_threshold() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();

    progress::get_or_create_progress(&db, "u1", today)
        .await
        .unwrap();
    sqlx::query(r#"UPDATE "user_progress" SET "currentXp" = 90 WHERE "userId" = 'u1'"#)
        .execute(db.pool())
        .await
        .unwrap();

    // 0s duration, 0 mistakes: 10 base + 20 bonus = 30 XP, crossing 100.
    let result = progress::apply_session(
        &db,
        "u1",
        &telemetry(today, 0.0, 0),
        StreakPolicy::Strict,
    )
    .await
    .unwrap();

    assert_eq!(result.total_xp, 120);
    assert_eq!(result.level, 2);
    assert!(result.level_up);
}

#[tokio::test]
async fn test_same_day_sessions_keep_streak_and_count_toward_goal() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();

    let first = progress::apply_session(
        &db,
        "u1",
        &telemetry(today, 60.0, 1),
        StreakPolicy::Strict,
    )
    .await
    .unwrap();
    let second = progress::apply_session(
        &db,
        "u1",
        &telemetry(today, 60.0, 1),
        StreakPolicy::Strict,
    )
    .await
    .unwrap();

    assert_eq!(first.streak, 1);
    assert_eq!(second.streak, 1);

    let record = progress::get_or_create_progress(&db, "u1", today)
        .await
        .unwrap();
    assert_eq!(record.daily_goal.completed, 2);
}

#[tokio::test]
async fn test_consecutive_days_extend_streak() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();

    for offset in (0..3).rev() {
        let date = today - Duration::days(offset);
        let result = progress::apply_session(
            &db,
            "u1",
            &telemetry(date, 60.0, 0),
            StreakPolicy::Strict,
        )
        .await
        .unwrap();
        assert_eq!(result.streak, 3 - offset);
    }
}

#[tokio::test]
async fn test_backdated_session_does_not_wipe_todays_goal_progress() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();

    progress::apply_session(&db, "u1", &telemetry(today, 60.0, 0), StreakPolicy::Strict)
        .await
        .unwrap();
    progress::apply_session(&db, "u1", &telemetry(today, 60.0, 0), StreakPolicy::Strict)
        .await
        .unwrap();

    // Import of an older session after today's practice.
    let backdated = progress::apply_session(
        &db,
        "u1",
        &telemetry(today - Duration::days(3), 60.0, 0),
        StreakPolicy::Strict,
    )
    .await
    .unwrap();
    assert_eq!(backdated.streak, 1);

    let record = progress::get_or_create_progress(&db, "u1", today)
        .await
        .unwrap();
    assert_eq!(record.daily_goal.completed, 2);
    assert_eq!(record.last_activity_date, Some(today));
}

#[tokio::test]
async fn test_two_day_gap_resets_streak_under_strict_policy() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();

    progress::apply_session(
        &db,
        "u1",
        &telemetry(today - Duration::days(2), 60.0, 0),
        StreakPolicy::Strict,
    )
    .await
    .unwrap();

    let result = progress::apply_session(
        &db,
        "u1",
        &telemetry(today, 60.0, 0),
        StreakPolicy::Strict,
    )
    .await
    .unwrap();
    assert_eq!(result.streak, 1);
}

#[tokio::test]
async fn test_shield_grace_bridges_one_missed_day_and_consumes_shield() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();
    let last_active = today - Duration::days(2);

    progress::apply_session(
        &db,
        "u1",
        &telemetry(last_active, 60.0, 0),
        StreakPolicy::ShieldGrace,
    )
    .await
    .unwrap();
    sqlx::query(r#"UPDATE "user_progress" SET "streak" = 7 WHERE "userId" = 'u1'"#)
        .execute(db.pool())
        .await
        .unwrap();
    sqlx::query(
        r#"
        INSERT INTO "quest_sets" ("userId", "date", "streakShieldEarned", "shieldUsed", "createdAt")
        VALUES ('u1', ?, 1, 0, ?)
        "#,
    )
    .bind(last_active.to_string())
    .bind(Utc::now().to_rfc3339())
    .execute(db.pool())
    .await
    .unwrap();

    let result = progress::apply_session(
        &db,
        "u1",
        &telemetry(today, 60.0, 0),
        StreakPolicy::ShieldGrace,
    )
    .await
    .unwrap();
    assert_eq!(result.streak, 8);

    let used: i64 = sqlx::query_scalar(
        r#"SELECT "shieldUsed" FROM "quest_sets" WHERE "userId" = 'u1' AND "date" = ?"#,
    )
    .bind(last_active.to_string())
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(used, 1);
}

#[tokio::test]
async fn test_quest_set_has_three_quests_and_is_stable() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();

    let first = quests::get_or_generate_quest_set(&db, "u1", today)
        .await
        .unwrap();
    assert_eq!(first.quests.len(), 3);
    assert_eq!(first.quests[0].quest_type, QuestType::Warmup);
    assert_eq!(first.quests[1].quest_type, QuestType::MistakeReview);
    assert_eq!(first.quests[2].quest_type, QuestType::Vocabulary);
    assert!(!first.all_completed);
    assert_eq!(first.total_xp_earned, 0);

    let second = quests::get_or_generate_quest_set(&db, "u1", today)
        .await
        .unwrap();
    let first_ids: Vec<_> = first.quests.iter().map(|q| q.id.clone()).collect();
    let second_ids: Vec<_> = second.quests.iter().map(|q| q.id.clone()).collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn test_quest_set_row_without_quests_is_backfilled() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();

    // A claimed date with no quest rows (e.g. an interrupted write from an
    // older build) must not stay empty forever.
    sqlx::query(
        r#"INSERT INTO "quest_sets" ("userId", "date", "createdAt") VALUES ('u1', ?, ?)"#,
    )
    .bind(today.to_string())
    .bind(Utc::now().to_rfc3339())
    .execute(db.pool())
    .await
    .unwrap();

    let set = quests::get_or_generate_quest_set(&db, "u1", today)
        .await
        .unwrap();
    assert_eq!(set.quests.len(), 3);

    let stored: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "quests" WHERE "userId" = 'u1' AND "date" = ?"#,
    )
    .bind(today.to_string())
    .fetch_one(db.pool())
    .await
    .unwrap();
    assert_eq!(stored, 3);
}

#[tokio::test]
async fn test_quest_progress_is_capped_and_terminal() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();

    let set = quests::get_or_generate_quest_set(&db, "u1", today)
        .await
        .unwrap();
    let quest = &set.quests[1];

    let partial = quests::update_quest_progress(&db, "u1", &quest.id, 1, None, today)
        .await
        .unwrap();
    assert_eq!(partial.progress, 1);
    assert!(!partial.completed);

    // Over-shooting increment lands exactly on the target.
    let done = quests::update_quest_progress(&db, "u1", &quest.id, quest.target + 10, None, today)
        .await
        .unwrap();
    assert_eq!(done.progress, quest.target);
    assert!(done.completed);

    let err = quests::update_quest_progress(&db, "u1", &quest.id, 1, None, today)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn test_quest_progress_rejects_other_days_and_unknown_quests() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();
    let yesterday = today - Duration::days(1);

    let set = quests::get_or_generate_quest_set(&db, "u1", yesterday)
        .await
        .unwrap();
    let err = quests::update_quest_progress(&db, "u1", &set.quests[0].id, 1, None, today)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = quests::update_quest_progress(&db, "u1", "missing", 1, None, today)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let err = quests::update_quest_progress(&db, "u1", &set.quests[0].id, 0, None, today)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

async fn complete_all_quests(db: &fluenta_backend_rust::db::Db, user_id: &str, date: NaiveDate) {
    let set = quests::get_or_generate_quest_set(db, user_id, date)
        .await
        .unwrap();
    for quest in &set.quests {
        quests::update_quest_progress(db, user_id, &quest.id, quest.target, None, date)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_completing_all_quests_on_seventh_streak_day_earns_shield() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();

    progress::apply_session(&db, "u1", &telemetry(today, 60.0, 0), StreakPolicy::Strict)
        .await
        .unwrap();
    sqlx::query(r#"UPDATE "user_progress" SET "streak" = 7 WHERE "userId" = 'u1'"#)
        .execute(db.pool())
        .await
        .unwrap();

    complete_all_quests(&db, "u1", today).await;

    let set = quests::load_quest_set(&db, "u1", today)
        .await
        .unwrap()
        .unwrap();
    assert!(set.all_completed);
    assert!(set.streak_shield_earned);
    assert_eq!(set.total_xp_earned, set.total_xp_available);
}

#[tokio::test]
async fn test_no_shield_off_the_weekly_cadence() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;
    let today = Utc::now().date_naive();

    progress::apply_session(&db, "u1", &telemetry(today, 60.0, 0), StreakPolicy::Strict)
        .await
        .unwrap();
    sqlx::query(r#"UPDATE "user_progress" SET "streak" = 8 WHERE "userId" = 'u1'"#)
        .execute(db.pool())
        .await
        .unwrap();

    complete_all_quests(&db, "u1", today).await;

    let set = quests::load_quest_set(&db, "u1", today)
        .await
        .unwrap()
        .unwrap();
    assert!(set.all_completed);
    assert!(!set.streak_shield_earned);
}

#[tokio::test]
async fn test_achievement_detection_is_idempotent_per_session() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;

    let facts = SessionFacts {
        session_id: "sess-1".to_string(),
        mistake_count: 0,
        mistake_categories: Vec::new(),
        streak: 7,
        total_sessions: 5,
    };

    let first = achievements::run_detection(&db, "u1", &facts).await.unwrap();
    assert!(!first.is_empty());

    achievements::run_detection(&db, "u1", &facts).await.unwrap();

    let stored = achievements::get_achievements(&db, "u1").await.unwrap();
    assert_eq!(stored.len(), first.len());
}

#[tokio::test]
async fn test_mark_viewed_is_idempotent_and_checks_ownership() {
    let db = common::create_test_db().await;
    common::seed_user(&db, "u1").await;

    let facts = SessionFacts {
        session_id: "sess-1".to_string(),
        mistake_count: 0,
        mistake_categories: Vec::new(),
        streak: 7,
        total_sessions: 1,
    };
    achievements::run_detection(&db, "u1", &facts).await.unwrap();

    let stored = achievements::get_achievements(&db, "u1").await.unwrap();
    let id = stored[0].id.clone();

    achievements::mark_viewed(&db, "u1", &id).await.unwrap();
    achievements::mark_viewed(&db, "u1", &id).await.unwrap();

    let stored = achievements::get_achievements(&db, "u1").await.unwrap();
    assert!(stored.iter().all(|a| a.id != id || !a.is_new));

    let err = achievements::mark_viewed(&db, "u1", "missing").await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
