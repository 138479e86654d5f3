use std::sync::Arc;
use std::time::Instant;

use crate::db::Db;
use crate::services::progress::StreakPolicy;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    db: Option<Arc<Db>>,
    streak_policy: StreakPolicy,
}

impl AppState {
    pub fn new(db: Option<Arc<Db>>, streak_policy: StreakPolicy) -> Self {
        Self {
            started_at: Instant::now(),
            db,
            streak_policy,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn db(&self) -> Option<Arc<Db>> {
        self.db.clone()
    }

    pub fn streak_policy(&self) -> StreakPolicy {
        self.streak_policy
    }
}
