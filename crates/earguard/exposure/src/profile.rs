//! Exposure profile configuration.
//!
//! A profile is the immutable snapshot the tick loop reads: the displayed
//! level range, the daily-budget anchor and the exchange rate. It only
//! changes through an explicit apply, which validates the whole record first.

use serde::{Deserialize, Serialize};

use crate::dose::allowed_duration_seconds;
use crate::error::{ExposureError, ExposureResult};

/// Eight hours, the daily reference duration.
pub const DAILY_BASE_TIME_SECS: f64 = 8.0 * 3600.0;

/// Minimum span between `min_db` and `max_db`.
pub const MIN_LEVEL_SPAN_DB: f64 = 10.0;

/// Tolerance used when matching a profile against a preset.
const PRESET_MATCH_TOLERANCE: f64 = 0.6;

/// Level mapping and dose budget parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExposureProfile {
    /// Level reported at 0 % volume.
    pub min_db: f64,
    /// Level reported at 100 % volume.
    pub max_db: f64,
    /// Level at which `base_time_sec` consumes exactly one full dose.
    pub ref_db: f64,
    /// Permitted duration at `ref_db`.
    pub base_time_sec: f64,
    /// dB increase that halves the permitted duration.
    pub exchange_rate_db: f64,
    /// Floor applied when hard-locking.
    pub min_enforced_volume: f64,
    /// Volume used on cold start.
    pub default_volume: f64,
}

impl Default for ExposureProfile {
    fn default() -> Self {
        Self::niosh()
    }
}

impl ExposureProfile {
    /// NIOSH occupational profile: 85 dB for 8 h, 3 dB exchange rate.
    pub fn niosh() -> Self {
        Self {
            min_db: 40.0,
            max_db: 95.0,
            ref_db: 85.0,
            base_time_sec: DAILY_BASE_TIME_SECS,
            exchange_rate_db: 3.0,
            min_enforced_volume: 5.0,
            default_volume: 30.0,
        }
    }

    /// WHO leisure-noise profile: 80 dB for 8 h, 3 dB exchange rate.
    pub fn who() -> Self {
        Self {
            ref_db: 80.0,
            ..Self::niosh()
        }
    }

    /// Build a profile from a preset, keeping the level range and volumes of `self`.
    pub fn with_preset(&self, preset: ProfilePreset) -> Self {
        let base = match preset {
            ProfilePreset::Niosh => Self::niosh(),
            ProfilePreset::Who => Self::who(),
            ProfilePreset::Custom => *self,
        };
        Self {
            ref_db: base.ref_db,
            exchange_rate_db: base.exchange_rate_db,
            base_time_sec: DAILY_BASE_TIME_SECS,
            ..*self
        }
    }

    /// Validate every field. Nothing is applied unless the whole profile passes.
    pub fn validate(&self) -> ExposureResult<()> {
        let fields = [
            ("min_db", self.min_db),
            ("max_db", self.max_db),
            ("ref_db", self.ref_db),
            ("base_time_sec", self.base_time_sec),
            ("exchange_rate_db", self.exchange_rate_db),
            ("min_enforced_volume", self.min_enforced_volume),
            ("default_volume", self.default_volume),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ExposureError::invalid(field, "must be a finite number"));
            }
        }

        if self.max_db - self.min_db < MIN_LEVEL_SPAN_DB {
            return Err(ExposureError::invalid(
                "max_db",
                format!(
                    "must be at least {MIN_LEVEL_SPAN_DB} dB above min_db ({} - {})",
                    self.max_db, self.min_db
                ),
            ));
        }
        if self.exchange_rate_db <= 0.0 {
            return Err(ExposureError::invalid(
                "exchange_rate_db",
                format!("must be > 0 (got {})", self.exchange_rate_db),
            ));
        }
        if self.base_time_sec <= 0.0 {
            return Err(ExposureError::invalid(
                "base_time_sec",
                format!("must be > 0 (got {})", self.base_time_sec),
            ));
        }
        for (field, value) in [
            ("min_enforced_volume", self.min_enforced_volume),
            ("default_volume", self.default_volume),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ExposureError::invalid(
                    field,
                    format!("must be within [0, 100] (got {value})"),
                ));
            }
        }
        Ok(())
    }

    /// Which preset this profile corresponds to, if any.
    pub fn preset(&self) -> ProfilePreset {
        let matches = |p: &ExposureProfile| {
            (self.ref_db - p.ref_db).abs() < PRESET_MATCH_TOLERANCE
                && (self.exchange_rate_db - p.exchange_rate_db).abs() < PRESET_MATCH_TOLERANCE
        };
        if matches(&Self::niosh()) {
            ProfilePreset::Niosh
        } else if matches(&Self::who()) {
            ProfilePreset::Who
        } else {
            ProfilePreset::Custom
        }
    }

    /// Start of the SAFE level band.
    pub fn safe_level_db(&self) -> f64 {
        self.ref_db - 15.0
    }

    /// Short human-readable description, e.g. `85 dB / 8h (3 dB)`.
    pub fn describe(&self) -> String {
        let hours = self.base_time_sec / 3600.0;
        format!(
            "{:.0} dB / {}h ({} dB)",
            self.ref_db,
            trim_float(hours),
            trim_float(self.exchange_rate_db)
        )
    }

    /// Permitted time at 85 dB and 90 dB, for previewing a candidate profile.
    pub fn preview(&self) -> ProfilePreview {
        ProfilePreview {
            at_85_db: format_coarse(allowed_duration_seconds(85.0, self)),
            at_90_db: format_coarse(allowed_duration_seconds(90.0, self)),
        }
    }
}

/// Named profile presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfilePreset {
    Niosh,
    Who,
    Custom,
}

impl std::fmt::Display for ProfilePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfilePreset::Niosh => write!(f, "NIOSH (85 dB / 8h, 3 dB)"),
            ProfilePreset::Who => write!(f, "WHO (80 dB / 8h, 3 dB)"),
            ProfilePreset::Custom => write!(f, "Custom"),
        }
    }
}

impl std::str::FromStr for ProfilePreset {
    type Err = ExposureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "niosh" => Ok(ProfilePreset::Niosh),
            "who" | "oms" => Ok(ProfilePreset::Who),
            "custom" => Ok(ProfilePreset::Custom),
            other => Err(ExposureError::invalid(
                "preset",
                format!("unknown preset '{other}'"),
            )),
        }
    }
}

/// Permitted time at two reference levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfilePreview {
    pub at_85_db: String,
    pub at_90_db: String,
}

fn format_coarse(seconds: f64) -> String {
    let s = seconds.max(0.0) as u64;
    let h = s / 3600;
    let m = (s % 3600) / 60;
    if h > 0 {
        format!("{h}h {m}min")
    } else {
        format!("{m}min")
    }
}

fn trim_float(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_niosh() {
        let p = ExposureProfile::default();
        assert_eq!(p.ref_db, 85.0);
        assert_eq!(p.base_time_sec, 28_800.0);
        assert_eq!(p.preset(), ProfilePreset::Niosh);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn who_preset_detected() {
        assert_eq!(ExposureProfile::who().preset(), ProfilePreset::Who);
        let custom = ExposureProfile {
            ref_db: 82.0,
            ..ExposureProfile::niosh()
        };
        assert_eq!(custom.preset(), ProfilePreset::Custom);
    }

    #[test]
    fn rejects_narrow_range() {
        let p = ExposureProfile {
            min_db: 40.0,
            max_db: 49.0,
            ..Default::default()
        };
        let err = p.validate().unwrap_err();
        assert!(matches!(
            err,
            ExposureError::ConfigurationInvalid { field: "max_db", .. }
        ));
    }

    #[test]
    fn rejects_non_positive_exchange_rate() {
        for er in [0.0, -3.0] {
            let p = ExposureProfile {
                exchange_rate_db: er,
                ..Default::default()
            };
            assert!(p.validate().is_err());
        }
    }

    #[test]
    fn rejects_out_of_range_volumes() {
        let p = ExposureProfile {
            min_enforced_volume: 101.0,
            ..Default::default()
        };
        assert!(p.validate().is_err());

        let p = ExposureProfile {
            default_volume: -1.0,
            ..Default::default()
        };
        assert!(p.validate().is_err());
    }

    #[test]
    fn with_preset_keeps_range_and_resets_base_time() {
        let current = ExposureProfile {
            min_db: 30.0,
            max_db: 100.0,
            base_time_sec: 100.0,
            min_enforced_volume: 10.0,
            ..ExposureProfile::niosh()
        };
        let who = current.with_preset(ProfilePreset::Who);
        assert_eq!(who.ref_db, 80.0);
        assert_eq!(who.min_db, 30.0);
        assert_eq!(who.min_enforced_volume, 10.0);
        assert_eq!(who.base_time_sec, DAILY_BASE_TIME_SECS);
    }

    #[test]
    fn describe_and_preview() {
        let p = ExposureProfile::niosh();
        assert_eq!(p.describe(), "85 dB / 8h (3 dB)");
        let preview = p.preview();
        assert_eq!(preview.at_85_db, "8h 0min");
        // 90 dB is 5 dB above ref: 28800 * 2^(-5/3) ~ 9071 s
        assert_eq!(preview.at_90_db, "2h 31min");
    }

    #[test]
    fn partial_record_falls_back_to_defaults() {
        let p: ExposureProfile = serde_json::from_str(r#"{"ref_db": 80.0}"#).unwrap();
        assert_eq!(p.ref_db, 80.0);
        assert_eq!(p.max_db, 95.0);
    }

    #[test]
    fn preset_from_str() {
        assert_eq!("NIOSH".parse::<ProfilePreset>().unwrap(), ProfilePreset::Niosh);
        assert_eq!("oms".parse::<ProfilePreset>().unwrap(), ProfilePreset::Who);
        assert!("loud".parse::<ProfilePreset>().is_err());
    }
}
