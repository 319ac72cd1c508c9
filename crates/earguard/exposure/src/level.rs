//! Level mapper: volume percentage to effective sound level and back.

use crate::profile::ExposureProfile;

const RANGE_EPSILON: f64 = 1e-9;

/// Clamp a percentage into `[0, 100]`. NaN maps to 0.
pub fn clamp_percent(pct: f64) -> f64 {
    if pct.is_nan() {
        0.0
    } else {
        pct.clamp(0.0, 100.0)
    }
}

/// Effective level for a volume percentage, by linear interpolation over
/// `[min_db, max_db]`.
pub fn percent_to_level(pct: f64, profile: &ExposureProfile) -> f64 {
    let pct = clamp_percent(pct);
    profile.min_db + (profile.max_db - profile.min_db) * (pct / 100.0)
}

/// Volume percentage that produces `level_db`, clamped to `[0, 100]`.
pub fn level_to_percent(level_db: f64, profile: &ExposureProfile) -> f64 {
    let span = (profile.max_db - profile.min_db).max(RANGE_EPSILON);
    clamp_percent((level_db - profile.min_db) / span * 100.0)
}

/// Snap a percentage to the nearest multiple of `quantum`, clamped to `[0, 100]`.
///
/// A non-positive quantum falls back to whole percent steps.
pub fn quantize_percent(pct: f64, quantum: f64) -> f64 {
    let q = if quantum > 0.0 { quantum } else { 1.0 };
    clamp_percent((pct / q).round() * q)
}

/// Half-up rounding for display (`49.5` -> `50`).
pub fn round_percent_display(pct: f64) -> i64 {
    (pct + 0.5).floor() as i64
}
