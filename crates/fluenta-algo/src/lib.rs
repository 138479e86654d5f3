//! Pure progression arithmetic shared by the backend.
//!
//! Everything in this crate is deterministic and side-effect free: the
//! XP/level curve and the per-session XP scoring rule. The backend must
//! derive levels through this crate only, so the cumulative-XP formula has a
//! single definition.

pub mod leveling;
pub mod scoring;

pub use leveling::{cumulative_xp, level_cost, level_for_xp, xp_progress, XpProgress};
pub use scoring::{session_xp, MIN_SESSION_XP};
