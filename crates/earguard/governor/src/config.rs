//! Governor modes, policy toggles and tuning constants.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GovernorError, GovernorResult};

/// Top-level governing mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoverningMode {
    /// Immediate cut to the safe zone when the remaining time runs out.
    #[default]
    Fixed,
    /// Gradual auto-limiting driven by a [`DynamicStrategy`].
    Dynamic,
}

impl std::fmt::Display for GoverningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GoverningMode::Fixed => write!(f, "fixed"),
            GoverningMode::Dynamic => write!(f, "dynamic"),
        }
    }
}

impl std::str::FromStr for GoverningMode {
    type Err = GovernorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(GoverningMode::Fixed),
            "dynamic" => Ok(GoverningMode::Dynamic),
            other => Err(GovernorError::ConfigurationInvalid(format!(
                "unknown mode '{other}'"
            ))),
        }
    }
}

/// Strategy used while in [`GoverningMode::Dynamic`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicStrategy {
    /// Protect a target reserve of remaining listening time.
    #[default]
    Reserve,
    /// Step down until the level sits in the SAFE band.
    SafeZone,
}

impl std::fmt::Display for DynamicStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DynamicStrategy::Reserve => write!(f, "reserve"),
            DynamicStrategy::SafeZone => write!(f, "safe_zone"),
        }
    }
}

impl std::str::FromStr for DynamicStrategy {
    type Err = GovernorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "reserve" => Ok(DynamicStrategy::Reserve),
            "safe_zone" | "safezone" => Ok(DynamicStrategy::SafeZone),
            other => Err(GovernorError::ConfigurationInvalid(format!(
                "unknown dynamic strategy '{other}'"
            ))),
        }
    }
}

/// Policy toggles owned by the governor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorPolicy {
    /// Hard-lock when a dose threshold signals it.
    pub hard_lock_enabled: bool,
    /// Hard-lock at the safe-zone target after a Fixed-mode auto-cut.
    pub lock_on_autoadjust: bool,
    /// Forbid increases above the soft ceiling while Dynamic mode reduces.
    pub softlock_enabled: bool,
    /// Strategy for Dynamic mode.
    pub strategy: DynamicStrategy,
    /// Numeric tuning.
    pub tuning: DynamicTuning,
}

impl Default for GovernorPolicy {
    fn default() -> Self {
        Self {
            hard_lock_enabled: true,
            lock_on_autoadjust: true,
            softlock_enabled: true,
            strategy: DynamicStrategy::Reserve,
            tuning: DynamicTuning::default(),
        }
    }
}

/// Numeric constants of the governing policies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicTuning {
    /// Reserve target as a fraction of the permitted duration.
    pub reserve_fraction: f64,
    pub reserve_min_secs: f64,
    pub reserve_max_secs: f64,
    /// Half-width of the band around the reserve target.
    pub hysteresis_secs: f64,
    /// Minimum spacing between automatic reductions.
    pub adjust_interval_ms: u64,
    /// Time the release condition must hold before the ceiling is cleared.
    pub release_delay_ms: u64,

    pub step_small_pct: f64,
    pub step_medium_pct: f64,
    pub step_large_pct: f64,
    /// Reserve deficits below this use the small step.
    pub deficit_small_secs: f64,
    /// Reserve deficits below this use the medium step.
    pub deficit_medium_secs: f64,
    /// Safe-zone levels below this use the small step.
    pub level_medium_db: f64,
    /// Safe-zone levels below this use the medium step.
    pub level_large_db: f64,

    /// Smoothing factor for the remaining-time EMA.
    pub ema_alpha: f64,
    /// Granularity of volumes written to the channel.
    pub volume_quantum_pct: f64,
    /// Fixed mode cuts once the smoothed remaining time drops to this value.
    ///
    /// At the default of 0 the smoothed remaining time stays positive while
    /// session dose is below 100 %, so the cut never fires and only the
    /// session-limit hard lock reduces the volume. Set a positive margin to
    /// cut ahead of the limit.
    pub fixed_cut_margin_secs: f64,

    /// Slack for user requests above the ceiling.
    pub user_tolerance_pct: f64,
    /// Slack for externally observed values above the ceiling.
    pub external_tolerance_pct: f64,
    /// Drift tolerated before the lock target is re-asserted.
    pub lock_tolerance_pct: f64,
    /// Difference before an external change is adopted as the new request.
    pub adopt_threshold_pct: f64,
}

impl Default for DynamicTuning {
    fn default() -> Self {
        Self {
            reserve_fraction: 0.10,
            reserve_min_secs: 600.0,
            reserve_max_secs: 1200.0,
            hysteresis_secs: 90.0,
            adjust_interval_ms: 600,
            release_delay_ms: 20_000,
            step_small_pct: 0.25,
            step_medium_pct: 0.5,
            step_large_pct: 1.0,
            deficit_small_secs: 60.0,
            deficit_medium_secs: 300.0,
            level_medium_db: 90.0,
            level_large_db: 95.0,
            ema_alpha: 0.25,
            volume_quantum_pct: 1.0,
            fixed_cut_margin_secs: 0.0,
            user_tolerance_pct: 0.01,
            external_tolerance_pct: 0.5,
            lock_tolerance_pct: 0.5,
            adopt_threshold_pct: 1.0,
        }
    }
}

impl DynamicTuning {
    pub fn adjust_interval(&self) -> Duration {
        Duration::from_millis(self.adjust_interval_ms)
    }

    pub fn release_delay(&self) -> Duration {
        Duration::from_millis(self.release_delay_ms)
    }

    /// Reserve target for a permitted duration, clamped to `[min, max]`.
    pub fn reserve_target(&self, allowed_secs: f64) -> f64 {
        (self.reserve_fraction * allowed_secs)
            .min(self.reserve_max_secs)
            .max(self.reserve_min_secs)
    }

    /// Step for a reserve deficit.
    pub fn reserve_step(&self, deficit_secs: f64) -> f64 {
        if deficit_secs < self.deficit_small_secs {
            self.step_small_pct
        } else if deficit_secs < self.deficit_medium_secs {
            self.step_medium_pct
        } else {
            self.step_large_pct
        }
    }

    /// Step for a level outside the SAFE band.
    pub fn level_step(&self, level_db: f64) -> f64 {
        if level_db < self.level_medium_db {
            self.step_small_pct
        } else if level_db < self.level_large_db {
            self.step_medium_pct
        } else {
            self.step_large_pct
        }
    }

    pub fn validate(&self) -> GovernorResult<()> {
        let invalid = |msg: String| Err(GovernorError::ConfigurationInvalid(msg));

        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return invalid(format!("ema_alpha must be in (0, 1], got {}", self.ema_alpha));
        }
        if self.reserve_min_secs > self.reserve_max_secs {
            return invalid(format!(
                "reserve_min_secs ({}) exceeds reserve_max_secs ({})",
                self.reserve_min_secs, self.reserve_max_secs
            ));
        }
        if self.volume_quantum_pct <= 0.0 {
            return invalid("volume_quantum_pct must be > 0".into());
        }
        let non_negative = [
            ("reserve_fraction", self.reserve_fraction),
            ("hysteresis_secs", self.hysteresis_secs),
            ("step_small_pct", self.step_small_pct),
            ("step_medium_pct", self.step_medium_pct),
            ("step_large_pct", self.step_large_pct),
            ("user_tolerance_pct", self.user_tolerance_pct),
            ("external_tolerance_pct", self.external_tolerance_pct),
            ("lock_tolerance_pct", self.lock_tolerance_pct),
            ("adopt_threshold_pct", self.adopt_threshold_pct),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return invalid(format!("{name} must be >= 0, got {value}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_target_is_clamped() {
        let t = DynamicTuning::default();
        assert_eq!(t.reserve_target(1800.0), 600.0);
        assert_eq!(t.reserve_target(9000.0), 900.0);
        assert_eq!(t.reserve_target(28_800.0), 1200.0);
    }

    #[test]
    fn step_bands() {
        let t = DynamicTuning::default();
        assert_eq!(t.reserve_step(30.0), 0.25);
        assert_eq!(t.reserve_step(60.0), 0.5);
        assert_eq!(t.reserve_step(299.0), 0.5);
        assert_eq!(t.reserve_step(300.0), 1.0);

        assert_eq!(t.level_step(86.0), 0.25);
        assert_eq!(t.level_step(90.0), 0.5);
        assert_eq!(t.level_step(95.0), 1.0);
    }

    #[test]
    fn validation() {
        assert!(DynamicTuning::default().validate().is_ok());

        let bad = DynamicTuning {
            ema_alpha: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = DynamicTuning {
            reserve_min_secs: 2000.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn mode_and_strategy_parse() {
        assert_eq!("Dynamic".parse::<GoverningMode>().unwrap(), GoverningMode::Dynamic);
        assert_eq!(
            "safe-zone".parse::<DynamicStrategy>().unwrap(),
            DynamicStrategy::SafeZone
        );
        assert!("turbo".parse::<GoverningMode>().is_err());
    }

    #[test]
    fn serde_names() {
        assert_eq!(
            serde_json::to_string(&DynamicStrategy::SafeZone).unwrap(),
            "\"safe_zone\""
        );
        assert_eq!(serde_json::to_string(&GoverningMode::Fixed).unwrap(), "\"fixed\"");
    }
}
