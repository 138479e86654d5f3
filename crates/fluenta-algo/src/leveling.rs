//! XP <-> level mapping.
//!
//! The cost of reaching level L from level L-1 grows linearly:
//! `(L-1)*100 + max(0, L-2)*50`. Level 1 is free. `cumulative_xp` is the
//! running sum of those costs and is strictly increasing, so `level_for_xp`
//! is its well-defined inverse.

use serde::Serialize;

/// XP required to advance from `level - 1` to `level`.
pub fn level_cost(level: i64) -> i64 {
    if level <= 1 {
        return 0;
    }
    (level - 1) * 100 + (level - 2).max(0) * 50
}

/// Total XP required to have reached `level`. `cumulative_xp(1) == 0`.
pub fn cumulative_xp(level: i64) -> i64 {
    if level <= 1 {
        return 0;
    }
    (2..=level).map(level_cost).sum()
}

/// The largest level whose cumulative cost does not exceed `xp`.
pub fn level_for_xp(xp: i64) -> i64 {
    let xp = xp.max(0);
    let mut level = 1;
    while cumulative_xp(level + 1) <= xp {
        level += 1;
    }
    level
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpProgress {
    pub xp_in_current_level: i64,
    pub xp_needed_for_next: i64,
    pub xp_until_next: i64,
    pub progress_percentage: f64,
}

/// Position of `xp` within `level`, for progress bars.
pub fn xp_progress(xp: i64, level: i64) -> XpProgress {
    let xp = xp.max(0);
    let floor = cumulative_xp(level);
    let ceiling = cumulative_xp(level + 1);

    let xp_in_current_level = xp - floor;
    let xp_needed_for_next = ceiling - floor;
    let xp_until_next = (ceiling - xp).max(0);
    let progress_percentage = if xp_needed_for_next > 0 {
        (xp_in_current_level as f64 / xp_needed_for_next as f64 * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    XpProgress {
        xp_in_current_level,
        xp_needed_for_next,
        xp_until_next,
        progress_percentage,
    }
}
