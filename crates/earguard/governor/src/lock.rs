//! Hard lock state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why the volume was hard-locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    /// Session dose reached 100 %.
    SessionLimit,
    /// Daily dose reached 100 %.
    DailyLimit,
    /// Fixed-mode cut with lock-on-autoadjust.
    AutoCut,
    /// Administrative lock.
    Manual,
}

impl std::fmt::Display for LockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockReason::SessionLimit => write!(f, "session limit"),
            LockReason::DailyLimit => write!(f, "daily limit"),
            LockReason::AutoCut => write!(f, "auto-cut"),
            LockReason::Manual => write!(f, "manual"),
        }
    }
}

/// An engaged hard lock. While present, the governed volume is pinned to
/// `target_pct` and every request is refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardLock {
    pub target_pct: f64,
    pub reason: LockReason,
    pub engaged_at: DateTime<Utc>,
}

impl HardLock {
    /// Build a lock. With `honor_min` the target is raised to `min_enforced`.
    pub fn new(target_pct: f64, min_enforced: f64, honor_min: bool, reason: LockReason) -> Self {
        let target = if honor_min {
            target_pct.max(min_enforced)
        } else {
            target_pct
        };
        Self {
            target_pct: earguard_exposure::clamp_percent(target),
            reason,
            engaged_at: Utc::now(),
        }
    }

    /// Whether `observed` has drifted more than `tolerance` from the target.
    pub fn drifted(&self, observed: f64, tolerance: f64) -> bool {
        (observed - self.target_pct).abs() > tolerance
    }
}
