//! Equal-energy dose model.
//!
//! Every `exchange_rate_db` above `ref_db` halves the permitted duration;
//! every `exchange_rate_db` below doubles it.

use crate::profile::ExposureProfile;

/// Floor for the permitted duration, so the dose rate stays finite.
pub const MIN_ALLOWED_SECS: f64 = 1.0;

/// Permitted exposure duration at `level_db` for a full daily dose.
pub fn allowed_duration_seconds(level_db: f64, profile: &ExposureProfile) -> f64 {
    let diff = level_db - profile.ref_db;
    let allowed = profile.base_time_sec * 2f64.powf(-diff / profile.exchange_rate_db);
    allowed.max(MIN_ALLOWED_SECS)
}

/// Dose fraction accumulated per second at `level_db`.
pub fn dose_rate_per_second(level_db: f64, profile: &ExposureProfile) -> f64 {
    1.0 / allowed_duration_seconds(level_db, profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_level_gets_base_time() {
        let p = ExposureProfile::niosh();
        assert_eq!(allowed_duration_seconds(85.0, &p), 28_800.0);
        let who = ExposureProfile::who();
        assert_eq!(allowed_duration_seconds(80.0, &who), 28_800.0);
    }

    #[test]
    fn three_db_above_reference_halves() {
        let p = ExposureProfile::niosh();
        assert!((allowed_duration_seconds(88.0, &p) - 14_400.0).abs() < 1e-6);
        assert!((allowed_duration_seconds(82.0, &p) - 57_600.0).abs() < 1e-6);
    }

    #[test]
    fn floored_at_one_second() {
        let p = ExposureProfile::niosh();
        assert_eq!(allowed_duration_seconds(200.0, &p), MIN_ALLOWED_SECS);
        assert_eq!(dose_rate_per_second(200.0, &p), 1.0);
    }

    #[test]
    fn rate_is_reciprocal() {
        let p = ExposureProfile::niosh();
        let rate = dose_rate_per_second(88.0, &p);
        assert!((rate - 1.0 / 14_400.0).abs() < 1e-15);
    }
}
