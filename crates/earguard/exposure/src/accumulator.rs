//! Exposure accumulator.
//!
//! Owns session and daily dose. Each tick integrates `dose_rate * elapsed`,
//! rolls the daily budget over at the local-date boundary, and fires the
//! one-shot threshold alerts of the current cycle.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dose::dose_rate_per_second;
use crate::level::round_percent_display;
use crate::profile::ExposureProfile;

/// Upper bound for the elapsed time integrated by a single tick.
pub const MAX_TICK_ELAPSED_SECS: f64 = 1.0;

/// Cap on the session dose fraction.
pub const SESSION_DOSE_CAP: f64 = 1.0;

/// Cap on the daily dose fraction (1000 %), kept above 1.0 for reporting.
pub const DAILY_DOSE_CAP: f64 = 10.0;

/// Daily dose percentage that raises the warning alert.
pub const DAILY_WARN_PCT: f64 = 80.0;

/// Daily dose percentage that raises the block alert.
pub const DAILY_BLOCK_PCT: f64 = 100.0;

/// Level change that restarts the "time at current level" timer.
pub const LEVEL_TIMER_EPSILON_DB: f64 = 1.0;

const THRESHOLD_EPSILON: f64 = 1e-9;

/// Clamp a raw scheduler delta into `[0, MAX_TICK_ELAPSED_SECS]`.
pub fn clamp_elapsed(elapsed_secs: f64) -> f64 {
    if elapsed_secs.is_nan() {
        0.0
    } else {
        elapsed_secs.clamp(0.0, MAX_TICK_ELAPSED_SECS)
    }
}

/// Notifications produced by [`ExposureAccumulator::advance`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExposureEvent {
    /// Session dose reached 50 %.
    SessionHalfDose,
    /// Session dose reached 100 %.
    SessionFullDose,
    /// Daily dose reached 80 % (and is still below 100 %).
    DailyWarning { daily_pct: f64 },
    /// Daily dose reached 100 %.
    DailyLimit { daily_pct: f64 },
    /// The local calendar date changed; daily and session dose restarted.
    DayRollover { previous: NaiveDate, current: NaiveDate },
}

impl ExposureEvent {
    /// Whether this event asks the governor to hard-lock.
    pub fn requests_lock(&self) -> bool {
        matches!(
            self,
            ExposureEvent::SessionFullDose | ExposureEvent::DailyLimit { .. }
        )
    }
}

/// One-shot alert flags, re-armed by reset or rollover.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFlags {
    pub alert_50_fired: bool,
    pub alert_100_fired: bool,
    pub daily_warn_fired: bool,
    pub daily_block_fired: bool,
}

/// Input for one accumulator tick.
#[derive(Debug, Clone, Copy)]
pub struct ExposureTick {
    /// Effective level this tick.
    pub level_db: f64,
    /// Volume that produced the level, used by the level timer.
    pub volume_pct: f64,
    /// Seconds since the previous tick, clamped to [`MAX_TICK_ELAPSED_SECS`].
    pub elapsed_secs: f64,
    /// Current local calendar date.
    pub today: NaiveDate,
}

/// Result of one accumulator tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceOutcome {
    /// Dose fraction added this tick.
    pub increment: f64,
    /// Events fired this tick, in evaluation order.
    pub events: Vec<ExposureEvent>,
}

impl AdvanceOutcome {
    /// Whether any event this tick requested a hard lock.
    pub fn lock_requested(&self) -> bool {
        self.events.iter().any(ExposureEvent::requests_lock)
    }
}

/// Tracks how long the effective level has stayed put.
#[derive(Debug, Clone, Default)]
struct LevelTimer {
    anchor_db: Option<f64>,
    anchor_pct: Option<i64>,
    elapsed_secs: f64,
}

impl LevelTimer {
    fn observe(&mut self, level_db: f64, volume_pct: f64) {
        let pct_key = round_percent_display(volume_pct);
        match self.anchor_db {
            None => {
                self.anchor_db = Some(level_db);
                self.anchor_pct = Some(pct_key);
            }
            Some(anchor) => {
                let moved = (level_db - anchor).abs() >= LEVEL_TIMER_EPSILON_DB;
                if moved || self.anchor_pct != Some(pct_key) {
                    self.anchor_db = Some(level_db);
                    self.anchor_pct = Some(pct_key);
                    self.elapsed_secs = 0.0;
                }
            }
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Session and daily dose state.
#[derive(Debug, Clone)]
pub struct ExposureAccumulator {
    session_dose: f64,
    daily_dose: f64,
    day_key: NaiveDate,
    flags: AlertFlags,
    timer: LevelTimer,
}

impl ExposureAccumulator {
    /// Create an accumulator anchored to `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            session_dose: 0.0,
            daily_dose: 0.0,
            day_key: today,
            flags: AlertFlags::default(),
            timer: LevelTimer::default(),
        }
    }

    pub fn session_dose(&self) -> f64 {
        self.session_dose
    }

    pub fn daily_dose(&self) -> f64 {
        self.daily_dose
    }

    /// Daily dose as a percentage of the budget.
    pub fn daily_dose_pct(&self) -> f64 {
        self.daily_dose * 100.0
    }

    pub fn day_key(&self) -> NaiveDate {
        self.day_key
    }

    pub fn flags(&self) -> AlertFlags {
        self.flags
    }

    /// Seconds since the effective level last moved by more than the timer band.
    pub fn time_at_current_level(&self) -> f64 {
        self.timer.elapsed_secs
    }

    /// Whether the session budget is spent.
    pub fn session_exhausted(&self) -> bool {
        self.session_dose >= SESSION_DOSE_CAP
    }

    /// Advance dose by one tick.
    ///
    /// Rollover is checked before integration so a tick straddling midnight
    /// credits its increment to the new day.
    pub fn advance(&mut self, profile: &ExposureProfile, tick: ExposureTick) -> AdvanceOutcome {
        let mut outcome = AdvanceOutcome::default();

        if let Some(event) = self.roll_day_if_needed(tick.today) {
            outcome.events.push(event);
        }

        let elapsed = clamp_elapsed(tick.elapsed_secs);
        let increment = dose_rate_per_second(tick.level_db, profile) * elapsed;
        outcome.increment = increment;

        self.session_dose = (self.session_dose + increment).min(SESSION_DOSE_CAP);
        self.daily_dose = (self.daily_dose + increment).min(DAILY_DOSE_CAP);

        self.timer.observe(tick.level_db, tick.volume_pct);
        if self.session_exhausted() {
            self.timer.elapsed_secs = 0.0;
        } else {
            self.timer.elapsed_secs += elapsed;
        }

        self.evaluate_thresholds(&mut outcome.events);

        debug!(
            level_db = tick.level_db,
            increment,
            session_dose = self.session_dose,
            daily_dose = self.daily_dose,
            "Exposure advanced"
        );

        outcome
    }

    /// Clear session dose and re-arm the session alerts. Daily dose is kept.
    pub fn reset_session(&mut self) {
        info!(session_dose = self.session_dose, "Session dose reset");
        self.session_dose = 0.0;
        self.flags.alert_50_fired = false;
        self.flags.alert_100_fired = false;
        self.timer.reset();
    }

    fn roll_day_if_needed(&mut self, today: NaiveDate) -> Option<ExposureEvent> {
        if today == self.day_key {
            return None;
        }
        let previous = self.day_key;
        info!(%previous, current = %today, daily_dose = self.daily_dose, "Day rollover");

        self.day_key = today;
        self.daily_dose = 0.0;
        self.session_dose = 0.0;
        self.flags = AlertFlags::default();
        self.timer.reset();

        Some(ExposureEvent::DayRollover {
            previous,
            current: today,
        })
    }

    fn evaluate_thresholds(&mut self, events: &mut Vec<ExposureEvent>) {
        if !self.flags.alert_50_fired && self.session_dose >= 0.5 - THRESHOLD_EPSILON {
            self.flags.alert_50_fired = true;
            warn!(session_dose = self.session_dose, "Session dose reached 50%");
            events.push(ExposureEvent::SessionHalfDose);
        }
        if !self.flags.alert_100_fired && self.session_dose >= SESSION_DOSE_CAP - THRESHOLD_EPSILON {
            self.flags.alert_100_fired = true;
            warn!(session_dose = self.session_dose, "Session dose reached 100%");
            events.push(ExposureEvent::SessionFullDose);
        }

        let daily_pct = self.daily_dose_pct();
        if !self.flags.daily_warn_fired
            && daily_pct >= DAILY_WARN_PCT - THRESHOLD_EPSILON
            && daily_pct < DAILY_BLOCK_PCT - THRESHOLD_EPSILON
        {
            self.flags.daily_warn_fired = true;
            warn!(daily_pct, "Daily dose reached warning band");
            events.push(ExposureEvent::DailyWarning { daily_pct });
        }
        if !self.flags.daily_block_fired && daily_pct >= DAILY_BLOCK_PCT - THRESHOLD_EPSILON {
            self.flags.daily_block_fired = true;
            warn!(daily_pct, "Daily dose reached 100%");
            events.push(ExposureEvent::DailyLimit { daily_pct });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn tick(level_db: f64, elapsed_secs: f64, today: NaiveDate) -> ExposureTick {
        ExposureTick {
            level_db,
            volume_pct: 50.0,
            elapsed_secs,
            today,
        }
    }

    #[test]
    fn half_dose_after_7200s_at_88db() {
        let profile = ExposureProfile::niosh();
        let mut acc = ExposureAccumulator::new(day(1));
        let mut half_alerts = 0;

        for _ in 0..7200 {
            let out = acc.advance(&profile, tick(88.0, 1.0, day(1)));
            half_alerts += out
                .events
                .iter()
                .filter(|e| **e == ExposureEvent::SessionHalfDose)
                .count();
        }

        assert!((acc.session_dose() - 0.5).abs() < 1e-9);
        assert_eq!(half_alerts, 1);
        assert!(acc.flags().alert_50_fired);

        // More time at the same level never re-fires the 50% alert.
        for _ in 0..100 {
            let out = acc.advance(&profile, tick(88.0, 1.0, day(1)));
            assert!(!out.events.contains(&ExposureEvent::SessionHalfDose));
        }
    }

    #[test]
    fn elapsed_is_clamped() {
        let profile = ExposureProfile::niosh();
        let mut acc = ExposureAccumulator::new(day(1));
        let out = acc.advance(&profile, tick(85.0, 3600.0, day(1)));
        assert!((out.increment - 1.0 / 28_800.0).abs() < 1e-15);

        let before = acc.session_dose();
        let out = acc.advance(&profile, tick(85.0, -5.0, day(1)));
        assert_eq!(out.increment, 0.0);
        assert_eq!(acc.session_dose(), before);
    }

    #[test]
    fn full_dose_requests_lock_once() {
        let profile = ExposureProfile::niosh();
        let mut acc = ExposureAccumulator::new(day(1));
        // 200 dB hits the one-second floor: one full dose per second.
        let out = acc.advance(&profile, tick(200.0, 1.0, day(1)));
        assert_eq!(acc.session_dose(), 1.0);
        assert!(out.lock_requested());
        assert!(out.events.contains(&ExposureEvent::SessionHalfDose));
        assert!(out.events.contains(&ExposureEvent::SessionFullDose));
        assert!(matches!(
            out.events.last(),
            Some(ExposureEvent::DailyLimit { .. })
        ));

        let out = acc.advance(&profile, tick(200.0, 1.0, day(1)));
        assert!(out.events.is_empty());
        assert_eq!(acc.session_dose(), 1.0);
        assert!((acc.daily_dose() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn daily_dose_is_capped_at_ten() {
        let profile = ExposureProfile::niosh();
        let mut acc = ExposureAccumulator::new(day(1));
        for _ in 0..15 {
            acc.advance(&profile, tick(200.0, 1.0, day(1)));
        }
        assert_eq!(acc.daily_dose(), DAILY_DOSE_CAP);
    }

    #[test]
    fn daily_warning_fires_in_band() {
        let profile = ExposureProfile::niosh();
        let mut acc = ExposureAccumulator::new(day(1));
        // 0.2 dose per second at allowed = 5 s.
        let level = 85.0 + 3.0 * (28_800.0f64 / 5.0).log2();
        let mut warnings = 0;
        for _ in 0..4 {
            let out = acc.advance(&profile, tick(level, 1.0, day(1)));
            warnings += out
                .events
                .iter()
                .filter(|e| matches!(e, ExposureEvent::DailyWarning { .. }))
                .count();
        }
        assert!((acc.daily_dose_pct() - 80.0).abs() < 1e-6);
        assert_eq!(warnings, 1);
        assert!(acc.flags().daily_warn_fired);
        assert!(!acc.flags().daily_block_fired);
    }

    #[test]
    fn rollover_resets_daily_state_mid_session() {
        let profile = ExposureProfile::niosh();
        let mut acc = ExposureAccumulator::new(day(1));
        for _ in 0..2 {
            acc.advance(&profile, tick(200.0, 1.0, day(1)));
        }
        assert!(acc.flags().daily_block_fired);

        let out = acc.advance(&profile, tick(40.0, 0.0, day(2)));
        assert_eq!(
            out.events.first(),
            Some(&ExposureEvent::DayRollover {
                previous: day(1),
                current: day(2)
            })
        );
        assert_eq!(acc.daily_dose(), 0.0);
        assert_eq!(acc.session_dose(), 0.0);
        assert_eq!(acc.flags(), AlertFlags::default());
        assert_eq!(acc.day_key(), day(2));
    }

    #[test]
    fn reset_session_keeps_daily_dose() {
        let profile = ExposureProfile::niosh();
        let mut acc = ExposureAccumulator::new(day(1));
        acc.advance(&profile, tick(200.0, 0.6, day(1)));
        assert!(acc.flags().alert_50_fired);

        acc.reset_session();
        assert_eq!(acc.session_dose(), 0.0);
        assert!(!acc.flags().alert_50_fired);
        assert!((acc.daily_dose() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn level_timer_restarts_on_change() {
        let profile = ExposureProfile::niosh();
        let mut acc = ExposureAccumulator::new(day(1));
        for _ in 0..5 {
            acc.advance(&profile, tick(60.0, 1.0, day(1)));
        }
        assert_eq!(acc.time_at_current_level(), 5.0);

        // 0.5 dB move inside the band keeps counting.
        acc.advance(&profile, tick(60.5, 1.0, day(1)));
        assert_eq!(acc.time_at_current_level(), 6.0);

        acc.advance(&profile, tick(62.0, 1.0, day(1)));
        assert_eq!(acc.time_at_current_level(), 1.0);

        let mut t = tick(62.0, 1.0, day(1));
        t.volume_pct = 51.0;
        acc.advance(&profile, t);
        assert_eq!(acc.time_at_current_level(), 1.0);
    }

    #[test]
    fn clamp_elapsed_handles_nan() {
        assert_eq!(clamp_elapsed(f64::NAN), 0.0);
        assert_eq!(clamp_elapsed(0.2), 0.2);
        assert_eq!(clamp_elapsed(7.0), 1.0);
    }
}
