use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

mod common;

#[tokio::test]
async fn test_health_root() {
    let (app, _db) = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_live() {
    let (app, _db) = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health/live")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_progress_requires_token() {
    let (app, _db) = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/progress")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_progress_defaults_for_new_user() {
    let (app, db) = common::create_test_app().await;
    let token = common::seed_user(&db, "u1").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/progress")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["currentLevel"], 1);
    assert_eq!(json["data"]["currentXp"], 0);
    assert_eq!(json["data"]["streak"], 0);
    assert_eq!(json["data"]["dailyGoal"]["completed"], 0);
}

#[tokio::test]
async fn test_record_session_returns_result_and_quests() {
    let (app, db) = common::create_test_app().await;
    let token = common::seed_user(&db, "u1").await;

    let body = serde_json::json!({
        "durationSeconds": 180.0,
        "mistakeCount": 2,
        "mistakeCategories": ["articles", "verb_tense"],
        "wordsSpoken": 120,
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/progress/session")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["success"], true);
    // 10 base + 3 min * 2 + (20 - 2 * 2) accuracy bonus
    assert_eq!(json["data"]["sessionResult"]["xp_earned"], 32);
    assert_eq!(json["data"]["sessionResult"]["streak"], 1);
    assert_eq!(json["data"]["progress"]["currentXp"], 32);
    assert_eq!(
        json["data"]["questSet"]["quests"].as_array().map(|q| q.len()),
        Some(3)
    );
}

#[tokio::test]
async fn test_record_session_rejects_negative_duration() {
    let (app, db) = common::create_test_app().await;
    let token = common::seed_user(&db, "u1").await;

    let body = serde_json::json!({
        "durationSeconds": -5.0,
        "mistakeCount": 0,
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/progress/session")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_quests_endpoint_generates_daily_set() {
    let (app, db) = common::create_test_app().await;
    let token = common::seed_user(&db, "u1").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/daily-quests")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["quests"].as_array().map(|q| q.len()), Some(3));
    assert_eq!(json["data"]["allCompleted"], false);
}

#[tokio::test]
async fn test_quests_endpoint_rejects_malformed_date() {
    let (app, db) = common::create_test_app().await;
    let token = common::seed_user(&db, "u1").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/daily-quests?date=03-2025-01")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_achievements_endpoint_shapes_response() {
    let (app, db) = common::create_test_app().await;
    let token = common::seed_user(&db, "u1").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/achievements")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["success"], true);
    assert!(json["data"]["achievements"].is_array());
    assert!(json["data"]["microWins"].is_array());
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let (app, _db) = common::create_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
