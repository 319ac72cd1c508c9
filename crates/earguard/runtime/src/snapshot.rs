//! Immutable state snapshots published to the presentation layer.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use earguard_exposure::RiskZone;
use earguard_governor::{DynamicStrategy, GovernorStatus, GoverningMode, HardLock};

/// Colouring band for the daily dose percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyBand {
    /// Below 80 %.
    Normal,
    /// 80 % up to 100 %.
    Warning,
    /// 100 % and above.
    Blocked,
}

impl DailyBand {
    pub fn from_pct(daily_pct: f64) -> Self {
        if daily_pct >= 100.0 {
            DailyBand::Blocked
        } else if daily_pct >= 80.0 {
            DailyBand::Warning
        } else {
            DailyBand::Normal
        }
    }
}

/// Everything a presentation sink needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureSnapshot {
    pub timestamp: DateTime<Local>,
    pub session_elapsed_secs: f64,

    pub volume_pct: f64,
    /// Volume rounded half-up for display.
    pub display_volume: i64,
    pub level_db: f64,
    /// Zone of the current level.
    pub level_zone: RiskZone,

    pub session_dose: f64,
    /// Zone of the session dose.
    pub zone: RiskZone,
    pub daily_dose_pct: f64,
    pub daily_band: DailyBand,

    pub allowed_secs: f64,
    /// Smoothed remaining time until 100 % session dose.
    pub remaining_secs: f64,
    pub time_at_level_secs: f64,

    pub mode: GoverningMode,
    pub strategy: DynamicStrategy,
    pub status: GovernorStatus,
    pub lock: Option<HardLock>,
    pub ceiling_pct: Option<f64>,
    pub paused: bool,
    /// Profile description, e.g. `85 dB / 8h (3 dB)`.
    pub profile: String,
}

impl ExposureSnapshot {
    pub fn locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn allowed_hms(&self) -> String {
        format_hms(self.allowed_secs)
    }

    pub fn remaining_hms(&self) -> String {
        format_hms(self.remaining_secs)
    }

    pub fn time_at_level_hms(&self) -> String {
        format_hms(self.time_at_level_secs)
    }
}

/// `HH:MM:SS`, truncating fractions and clamping negatives to zero. Hours
/// are not wrapped at 24.
pub fn format_hms(seconds: f64) -> String {
    let s = if seconds.is_finite() {
        seconds.max(0.0) as u64
    } else {
        0
    };
    format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}
