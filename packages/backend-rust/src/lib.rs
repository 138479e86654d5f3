pub mod auth;
pub mod config;
pub mod db;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::progress::StreakPolicy;
use crate::state::AppState;

/// Builds the full application router around an already-opened database.
pub fn create_app(db: Arc<db::Db>, streak_policy: StreakPolicy) -> axum::Router {
    let state = AppState::new(Some(db), streak_policy);

    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
