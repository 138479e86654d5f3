//! Per-session XP award.
//!
//! The award is a fixed base plus a capped duration bonus plus an accuracy
//! bonus that shrinks with every mistake. Invariants the rest of the system
//! relies on: the result is never below [`MIN_SESSION_XP`], never decreases
//! when duration grows, and never increases when the mistake count grows.

/// Every completed session earns at least this much.
pub const MIN_SESSION_XP: i64 = 10;

const DURATION_CAP_MINUTES: i64 = 10;
const XP_PER_MINUTE: i64 = 2;
const ACCURACY_BONUS_MAX: i64 = 20;
const XP_LOST_PER_MISTAKE: i64 = 2;

/// XP earned for one completed practice session.
pub fn session_xp(duration_seconds: f64, mistake_count: i64) -> i64 {
    let minutes = (duration_seconds.max(0.0) as i64) / 60;
    let duration_bonus = minutes.min(DURATION_CAP_MINUTES) * XP_PER_MINUTE;
    let accuracy_bonus =
        (ACCURACY_BONUS_MAX - mistake_count.max(0) * XP_LOST_PER_MISTAKE).max(0);

    MIN_SESSION_XP + duration_bonus + accuracy_bonus
}
