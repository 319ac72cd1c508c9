//! Per-second history samples.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use earguard_exposure::RiskZone;
use earguard_governor::GoverningMode;

/// One history point, recorded roughly once per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureSample {
    pub timestamp: DateTime<Local>,
    /// Seconds since the session started.
    pub session_elapsed_secs: f64,
    pub mode: GoverningMode,
    pub volume_pct: f64,
    pub level_db: f64,
    /// Session dose fraction.
    pub dose: f64,
    /// Session-dose zone.
    pub zone: RiskZone,
    /// Daily dose fraction.
    pub daily_dose: f64,
}

/// Samples within the trailing `window_secs` of the last sample.
pub fn recent_window(samples: &[ExposureSample], window_secs: f64) -> &[ExposureSample] {
    let Some(last) = samples.last() else {
        return samples;
    };
    let start = (last.session_elapsed_secs - window_secs).max(0.0);
    let first = samples.partition_point(|s| s.session_elapsed_secs < start);
    &samples[first..]
}
