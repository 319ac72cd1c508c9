//! Session summary statistics.

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};
use crate::sample::ExposureSample;

/// Aggregates over a session history.
///
/// Time is the sum of `max(0, t[i+1] - t[i])` over consecutive pairs and the
/// average level weights `level[i]` by that interval. Peaks, the maximum
/// dose and the first-crossing times also consider the last sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub points: usize,
    pub total_secs: f64,
    /// Time-weighted average level. Zero when no time elapsed.
    pub avg_level_db: f64,
    pub peak_level_db: f64,
    pub peak_volume_pct: f64,
    pub max_dose: f64,
    /// Session time at which the dose first reached 50 %.
    pub time_to_half_dose_secs: Option<f64>,
    /// Session time at which the dose first reached 100 %.
    pub time_to_full_dose_secs: Option<f64>,
}

impl SessionSummary {
    pub fn from_samples(samples: &[ExposureSample]) -> ReportResult<Self> {
        if samples.is_empty() {
            return Err(ReportError::Empty);
        }

        let mut total_secs = 0.0;
        let mut weighted_level = 0.0;
        for pair in samples.windows(2) {
            let dt = (pair[1].session_elapsed_secs - pair[0].session_elapsed_secs).max(0.0);
            total_secs += dt;
            weighted_level += pair[0].level_db * dt;
        }

        let mut peak_level_db = f64::NEG_INFINITY;
        let mut peak_volume_pct = f64::NEG_INFINITY;
        let mut max_dose: f64 = 0.0;
        let mut time_to_half_dose_secs = None;
        let mut time_to_full_dose_secs = None;

        for s in samples {
            peak_level_db = peak_level_db.max(s.level_db);
            peak_volume_pct = peak_volume_pct.max(s.volume_pct);
            max_dose = max_dose.max(s.dose);
            if time_to_half_dose_secs.is_none() && s.dose >= 0.5 {
                time_to_half_dose_secs = Some(s.session_elapsed_secs);
            }
            if time_to_full_dose_secs.is_none() && s.dose >= 1.0 {
                time_to_full_dose_secs = Some(s.session_elapsed_secs);
            }
        }

        let avg_level_db = if total_secs > 0.0 {
            weighted_level / total_secs
        } else {
            0.0
        };

        tracing::debug!(points = samples.len(), total_secs, "Session summary computed");

        Ok(Self {
            points: samples.len(),
            total_secs,
            avg_level_db,
            peak_level_db,
            peak_volume_pct,
            max_dose,
            time_to_half_dose_secs,
            time_to_full_dose_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::fixtures::sample;

    #[test]
    fn empty_history_is_an_error() {
        assert!(matches!(
            SessionSummary::from_samples(&[]),
            Err(ReportError::Empty)
        ));
    }

    #[test]
    fn single_sample_has_no_duration() {
        let s = SessionSummary::from_samples(&[sample(3.0, 80.0, 70.0, 0.6)]).unwrap();
        assert_eq!(s.points, 1);
        assert_eq!(s.total_secs, 0.0);
        assert_eq!(s.avg_level_db, 0.0);
        assert_eq!(s.peak_level_db, 80.0);
        assert_eq!(s.time_to_half_dose_secs, Some(3.0));
        assert_eq!(s.time_to_full_dose_secs, None);
    }

    #[test]
    fn weighted_average_uses_leading_level() {
        let samples = vec![
            sample(0.0, 70.0, 50.0, 0.0),
            sample(1.0, 80.0, 60.0, 0.2),
            sample(4.0, 90.0, 80.0, 0.5),
        ];
        let s = SessionSummary::from_samples(&samples).unwrap();
        assert_eq!(s.total_secs, 4.0);
        // (70 * 1 + 80 * 3) / 4
        assert!((s.avg_level_db - 77.5).abs() < 1e-12);
        // Last sample counts for peaks and crossings.
        assert_eq!(s.peak_level_db, 90.0);
        assert_eq!(s.peak_volume_pct, 80.0);
        assert_eq!(s.max_dose, 0.5);
        assert_eq!(s.time_to_half_dose_secs, Some(4.0));
    }

    #[test]
    fn backwards_time_does_not_count() {
        let samples = vec![
            sample(10.0, 70.0, 50.0, 0.0),
            sample(5.0, 70.0, 50.0, 0.0),
            sample(7.0, 70.0, 50.0, 1.0),
        ];
        let s = SessionSummary::from_samples(&samples).unwrap();
        assert_eq!(s.total_secs, 2.0);
        assert_eq!(s.time_to_full_dose_secs, Some(7.0));
    }
}
