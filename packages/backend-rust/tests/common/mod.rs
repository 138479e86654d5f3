#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;

use fluenta_backend_rust::auth::{hash_token, sign_jwt_for_user};
use fluenta_backend_rust::db::{apply_schema_to_pool, Db};
use fluenta_backend_rust::services::progress::StreakPolicy;

pub const TEST_JWT_SECRET: &str = "integration-test-secret";

/// Fresh in-memory database with the full schema applied. A single
/// connection keeps the in-memory store alive for the test's duration.
pub async fn create_test_db() -> Arc<Db> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");

    apply_schema_to_pool(&pool).await.expect("apply schema");

    Arc::new(Db::from_pool(pool))
}

pub async fn create_test_app() -> (Router, Arc<Db>) {
    std::env::set_var("JWT_SECRET", TEST_JWT_SECRET);
    let db = create_test_db().await;
    let app = fluenta_backend_rust::create_app(Arc::clone(&db), StreakPolicy::Strict);
    (app, db)
}

/// Inserts a user plus a live session row and returns a bearer token for it.
pub async fn seed_user(db: &Db, user_id: &str) -> String {
    std::env::set_var("JWT_SECRET", TEST_JWT_SECRET);

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    sqlx::query(
        r#"
        INSERT INTO "users" ("id", "email", "username", "createdAt", "updatedAt")
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(format!("{user_id}@example.com"))
    .bind(user_id)
    .bind(&now)
    .bind(&now)
    .execute(db.pool())
    .await
    .expect("insert user");

    let (token, expires_at) = sign_jwt_for_user(user_id).expect("sign token");

    sqlx::query(
        r#"INSERT INTO "sessions" ("token", "userId", "expiresAt") VALUES (?, ?, ?)"#,
    )
    .bind(hash_token(&token))
    .bind(user_id)
    .bind(expires_at.to_rfc3339_opts(SecondsFormat::Millis, true))
    .execute(db.pool())
    .await
    .expect("insert session");

    token
}
