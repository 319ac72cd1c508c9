//! The monitor core: single owner of profile, dose, governor and history.
//!
//! Every mutation goes through `&mut MonitorCore`, so the tick loop and the
//! lock enforcer never observe partial governor state. The async layer in
//! [`crate::monitor`] serializes access with one mutex.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use tracing::{debug, info, instrument, warn};

use earguard_exposure::{
    allowed_duration_seconds, clamp_elapsed, percent_to_level, round_percent_display,
    zone_from_dose_fraction, zone_from_level, ExposureAccumulator, ExposureProfile, ExposureTick,
    DAILY_BASE_TIME_SECS,
};
use earguard_governor::{
    ChannelError, DynamicStrategy, DynamicTuning, GovernorError, GovernorInput, GoverningMode,
    HardLock, LockReason, Reconciliation, VolumeChannel, VolumeDecision, VolumeGovernor, VolumeSource,
};
use earguard_report::{recent_window, ExposureSample};

use crate::command::ConfigurationUpdate;
use crate::config::RuntimeConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::event::MonitorEvent;
use crate::settings::PersistedSettings;
use crate::snapshot::{DailyBand, ExposureSnapshot};

pub struct MonitorCore {
    config: RuntimeConfig,
    profile: ExposureProfile,
    accumulator: ExposureAccumulator,
    governor: VolumeGovernor,
    channel: Arc<dyn VolumeChannel>,
    history: Vec<ExposureSample>,
    events: Vec<MonitorEvent>,
    paused: bool,
    session_started: Instant,
    last_tick: Option<Instant>,
    last_reconcile: Option<Instant>,
    last_history: Option<Instant>,
}

impl MonitorCore {
    pub fn new(
        settings: PersistedSettings,
        tuning: DynamicTuning,
        channel: Arc<dyn VolumeChannel>,
        config: RuntimeConfig,
        now: Instant,
        today: chrono::NaiveDate,
    ) -> MonitorResult<Self> {
        settings.profile.validate()?;
        let governor =
            VolumeGovernor::new(settings.policy(tuning), settings.mode, settings.volume)?;

        Ok(Self {
            config,
            profile: settings.profile,
            accumulator: ExposureAccumulator::new(today),
            governor,
            channel,
            history: Vec::new(),
            events: Vec::new(),
            paused: false,
            session_started: now,
            last_tick: None,
            last_reconcile: None,
            last_history: None,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn profile(&self) -> &ExposureProfile {
        &self.profile
    }

    pub fn accumulator(&self) -> &ExposureAccumulator {
        &self.accumulator
    }

    pub fn governor(&self) -> &VolumeGovernor {
        &self.governor
    }

    pub fn is_locked(&self) -> bool {
        self.governor.is_locked()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn history(&self) -> &[ExposureSample] {
        &self.history
    }

    /// History inside the trailing chart window.
    pub fn chart_window(&self) -> &[ExposureSample] {
        recent_window(&self.history, self.config.chart_window_secs)
    }

    /// Current settings record, as persisted.
    pub fn settings(&self) -> PersistedSettings {
        let policy = self.governor.policy();
        PersistedSettings {
            mode: self.governor.mode(),
            volume: self.governor.volume_pct(),
            profile: self.profile,
            hard_lock_enabled: policy.hard_lock_enabled,
            lock_on_autoadjust: policy.lock_on_autoadjust,
            dynamic_strategy: policy.strategy,
            dynamic_softlock_enabled: policy.softlock_enabled,
        }
    }

    /// Take the notifications accumulated since the last call.
    pub fn drain_events(&mut self) -> Vec<MonitorEvent> {
        std::mem::take(&mut self.events)
    }

    // =========================================================================
    // Channel
    // =========================================================================

    /// Adopt the channel's value at startup when it differs from the
    /// restored volume by more than the sync threshold, then write the
    /// governed volume back.
    pub fn initial_sync(&mut self) {
        match self.channel.get_percent() {
            Ok(observed) => {
                let restored = self.governor.volume_pct();
                if (observed - restored).abs() > self.config.initial_sync_threshold_pct {
                    info!(observed, restored, "Adopting system volume at startup");
                    self.governor.request_volume(observed, VolumeSource::External);
                }
            }
            Err(e) => self.channel_failed(&e),
        }
        self.write_channel(self.governor.channel_target());
    }

    fn write_channel(&mut self, pct: f64) {
        if let Err(e) = self.channel.set_percent(pct) {
            self.channel_failed(&e);
        }
    }

    fn channel_failed(&mut self, error: &ChannelError) {
        if self.governor.note_channel_failure(error) {
            self.events.push(MonitorEvent::ChannelUnavailable {
                error: error.to_string(),
            });
        }
    }

    fn reconcile(&mut self, now: Instant) {
        let due = self
            .last_reconcile
            .map_or(true, |t| now.saturating_duration_since(t) >= self.config.reconcile_period());
        if !due {
            return;
        }
        self.last_reconcile = Some(now);

        let observed = match self.channel.get_percent() {
            Ok(v) => v,
            Err(e) => {
                self.channel_failed(&e);
                return;
            }
        };
        match self.governor.reconcile_external(observed) {
            Reconciliation::InSync => {}
            Reconciliation::Adopted(pct) => {
                self.events.push(MonitorEvent::ExternalVolumeAdopted { pct });
            }
            Reconciliation::Reassert(pct) => {
                debug!(observed, target = pct, "Re-asserting governed volume");
                self.write_channel(pct);
            }
        }
    }

    /// Lock enforcer pass. Re-asserts the lock target when the channel has
    /// drifted. A failed read re-asserts unconditionally.
    pub fn enforce(&mut self) {
        let Some(target) = self.governor.lock().map(|l| l.target_pct) else {
            return;
        };
        let write = match self.channel.get_percent() {
            Ok(observed) => self.governor.enforce_lock(observed),
            Err(_) => Some(target),
        };
        if let Some(target) = write {
            self.write_channel(target);
        }
    }

    fn lock_engaged(&mut self, lock: HardLock) {
        self.events.push(MonitorEvent::LockEngaged {
            target_pct: lock.target_pct,
            reason: lock.reason,
        });
        self.write_channel(lock.target_pct);
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// One governor tick: reconcile with the channel, integrate dose,
    /// evaluate the governing policy, sample history, build a snapshot.
    pub fn tick(&mut self, now: Instant, wall: DateTime<Local>) -> ExposureSnapshot {
        let elapsed = self
            .last_tick
            .map_or(0.0, |t| clamp_elapsed(now.saturating_duration_since(t).as_secs_f64()));
        self.last_tick = Some(now);

        self.reconcile(now);

        let volume = self.governor.volume_pct();
        let level_db = percent_to_level(volume, &self.profile);
        let allowed_secs = allowed_duration_seconds(level_db, &self.profile);

        if self.paused {
            self.governor.mark_paused();
        } else {
            let outcome = self.accumulator.advance(
                &self.profile,
                ExposureTick {
                    level_db,
                    volume_pct: volume,
                    elapsed_secs: elapsed,
                    today: wall.date_naive(),
                },
            );
            for event in outcome.events {
                if let Some(lock) = self.governor.on_exposure_event(&event, &self.profile) {
                    self.lock_engaged(lock);
                }
                self.events.push(MonitorEvent::Exposure { exposure: event });
            }

            let decision = self.governor.evaluate(
                &self.profile,
                GovernorInput {
                    level_db,
                    session_dose: self.accumulator.session_dose(),
                    allowed_secs,
                    now,
                },
            );
            if let Some(lock) = decision.lock_engaged {
                self.lock_engaged(lock);
            } else if decision.volume_changed {
                self.write_channel(self.governor.channel_target());
            }
            if decision.ceiling_released {
                self.events.push(MonitorEvent::CeilingReleased);
            }

            self.sample_history(now, wall, level_db);
        }

        self.snapshot(now, wall, level_db, allowed_secs)
    }

    fn sample_history(&mut self, now: Instant, wall: DateTime<Local>, level_db: f64) {
        let due = self
            .last_history
            .map_or(true, |t| now.saturating_duration_since(t) >= self.config.history_period());
        if !due {
            return;
        }
        self.last_history = Some(now);

        let dose = self.accumulator.session_dose();
        self.history.push(ExposureSample {
            timestamp: wall,
            session_elapsed_secs: self.session_elapsed(now),
            mode: self.governor.mode(),
            volume_pct: self.governor.volume_pct(),
            level_db,
            dose,
            zone: zone_from_dose_fraction(dose),
            daily_dose: self.accumulator.daily_dose(),
        });
    }

    fn session_elapsed(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.session_started).as_secs_f64()
    }

    fn snapshot(
        &self,
        now: Instant,
        wall: DateTime<Local>,
        level_db: f64,
        allowed_secs: f64,
    ) -> ExposureSnapshot {
        let session_dose = self.accumulator.session_dose();
        let raw_remaining = if session_dose < 1.0 {
            (1.0 - session_dose) * allowed_secs
        } else {
            0.0
        };
        let daily_dose_pct = self.accumulator.daily_dose_pct();
        let volume_pct = self.governor.volume_pct();

        ExposureSnapshot {
            timestamp: wall,
            session_elapsed_secs: self.session_elapsed(now),
            volume_pct,
            display_volume: round_percent_display(volume_pct),
            level_db,
            level_zone: zone_from_level(level_db, &self.profile),
            session_dose,
            zone: zone_from_dose_fraction(session_dose),
            daily_dose_pct,
            daily_band: DailyBand::from_pct(daily_dose_pct),
            allowed_secs,
            remaining_secs: self.governor.smoothed_remaining().unwrap_or(raw_remaining),
            time_at_level_secs: self.accumulator.time_at_current_level(),
            mode: self.governor.mode(),
            strategy: self.governor.strategy(),
            status: self.governor.status(),
            lock: self.governor.lock().cloned(),
            ceiling_pct: self.governor.ceiling(),
            paused: self.paused,
            profile: self.profile.describe(),
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    #[instrument(skip(self))]
    pub fn request_volume(&mut self, pct: f64) -> VolumeDecision {
        let decision = self.governor.request_volume(pct, VolumeSource::User);
        match decision {
            VolumeDecision::Accepted { .. } => {}
            VolumeDecision::Clamped { requested, applied } => {
                self.events
                    .push(MonitorEvent::VolumeClamped { requested, applied });
            }
            VolumeDecision::Rejected { reason, .. } => {
                self.events.push(MonitorEvent::VolumeRejected {
                    requested: pct,
                    reason,
                });
            }
        }
        self.write_channel(self.governor.channel_target());
        decision
    }

    #[instrument(skip(self))]
    pub fn set_mode(&mut self, mode: GoverningMode) -> MonitorResult<()> {
        self.governor.set_mode(mode)?;
        self.events.push(MonitorEvent::ModeChanged { mode });
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn set_strategy(&mut self, strategy: DynamicStrategy) {
        self.governor.set_strategy(strategy);
        self.events.push(MonitorEvent::StrategyChanged { strategy });
    }

    /// Pause or resume dose integration. Refused while hard-locked.
    #[instrument(skip(self))]
    pub fn set_paused(&mut self, paused: bool) -> MonitorResult<()> {
        if let Some(lock) = self.governor.lock() {
            return Err(MonitorError::Governor(GovernorError::Locked {
                reason: lock.reason,
            }));
        }
        if self.paused != paused {
            self.paused = paused;
            // Resuming must not integrate the paused interval.
            self.last_tick = None;
            self.events.push(MonitorEvent::PauseChanged { paused });
        }
        Ok(())
    }

    /// Reset session dose, history and governor state. Releases the lock.
    #[instrument(skip(self))]
    pub fn reset_session(&mut self, now: Instant) {
        self.accumulator.reset_session();
        if let Some(lock) = self.governor.reset_session() {
            self.events
                .push(MonitorEvent::LockReleased { reason: lock.reason });
        }
        self.history.clear();
        self.session_started = now;
        self.last_history = None;
        self.last_tick = None;
        info!("Session reset");
        self.events.push(MonitorEvent::SessionReset);
    }

    /// Validate and apply a new profile and governor toggles. On error
    /// nothing changes.
    #[instrument(skip(self, update))]
    pub fn apply_configuration(&mut self, update: ConfigurationUpdate) -> MonitorResult<()> {
        let mut profile = update.profile;
        profile.base_time_sec = DAILY_BASE_TIME_SECS;
        profile.validate()?;

        let mut policy = *self.governor.policy();
        policy.strategy = update.strategy;
        policy.softlock_enabled = update.softlock_enabled;
        policy.hard_lock_enabled = update.hard_lock_enabled;
        policy.lock_on_autoadjust = update.lock_on_autoadjust;
        self.governor.set_policy(policy)?;

        self.profile = profile;
        info!(profile = %profile.describe(), strategy = %update.strategy, "Configuration applied");
        self.events.push(MonitorEvent::ConfigurationApplied);
        Ok(())
    }

    /// Administrative lock.
    pub fn lock(&mut self, target_pct: f64) {
        if let Some(lock) = self
            .governor
            .engage_lock(target_pct, LockReason::Manual, true, &self.profile)
        {
            self.lock_engaged(lock);
        }
    }

    /// Administrative unlock.
    pub fn unlock(&mut self) -> Option<HardLock> {
        let released = self.governor.unlock();
        if let Some(lock) = &released {
            self.events
                .push(MonitorEvent::LockReleased { reason: lock.reason });
        }
        released
    }

    /// Release the lock for shutdown and return the settings to persist.
    pub fn shutdown(&mut self) -> PersistedSettings {
        if self.governor.unlock().is_some() {
            warn!("Hard lock released for shutdown");
        }
        self.settings()
    }
}

impl std::fmt::Debug for MonitorCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorCore")
            .field("channel", &self.channel.name())
            .field("profile", &self.profile)
            .field("governor", &self.governor.state())
            .field("paused", &self.paused)
            .field("history_len", &self.history.len())
            .finish()
    }
}
