//! The volume governor.
//!
//! Owns the requested volume and every piece of governing state: mode,
//! soft ceiling, hard lock, limiting and decay flags, the remaining-time
//! EMA. It is a plain synchronous state machine. The caller serializes
//! access and performs the channel writes it asks for.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use earguard_exposure::{
    clamp_percent, level_to_percent, quantize_percent, zone_from_level, ExposureEvent,
    ExposureProfile, RiskZone,
};

use crate::ceiling::SoftCeiling;
use crate::config::{DynamicStrategy, GovernorPolicy, GoverningMode};
use crate::error::{ChannelError, GovernorError, GovernorResult};
use crate::lock::{HardLock, LockReason};

/// Minimum change for a Dynamic reduction to count as applied.
const MIN_EFFECTIVE_STEP_PCT: f64 = 0.1;
/// Reserve decay only applies when it lowers the volume by more than this.
const RESERVE_DECAY_EPSILON_PCT: f64 = 0.099;

/// Where a volume request came from. Determines the ceiling tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeSource {
    User,
    External,
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "reason")]
pub enum RejectReason {
    Locked(LockReason),
    /// Dynamic mode is stepping the volume down; increases are ignored.
    DecayInProgress,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::Locked(reason) => write!(f, "locked ({reason})"),
            RejectReason::DecayInProgress => write!(f, "decay in progress"),
        }
    }
}

/// Result of [`VolumeGovernor::request_volume`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum VolumeDecision {
    Accepted { applied: f64 },
    Clamped { requested: f64, applied: f64 },
    Rejected { applied: f64, reason: RejectReason },
}

impl VolumeDecision {
    /// Volume the governor holds after the request.
    pub fn applied(&self) -> f64 {
        match self {
            VolumeDecision::Accepted { applied }
            | VolumeDecision::Clamped { applied, .. }
            | VolumeDecision::Rejected { applied, .. } => *applied,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, VolumeDecision::Rejected { .. })
    }
}

/// Governor status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum GovernorStatus {
    #[default]
    Normal,
    Paused,
    Locked(LockReason),
    /// Fixed mode cut the volume to the safe zone.
    AutoCut,
    /// Dynamic-Reserve is limiting.
    Limiting,
    /// Dynamic-SafeZone is limiting.
    LimitingToSafeZone,
}

impl std::fmt::Display for GovernorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GovernorStatus::Normal => write!(f, "normal"),
            GovernorStatus::Paused => write!(f, "paused"),
            GovernorStatus::Locked(reason) => write!(f, "locked ({reason})"),
            GovernorStatus::AutoCut => write!(f, "cut to safe zone"),
            GovernorStatus::Limiting => write!(f, "limiting (reserve)"),
            GovernorStatus::LimitingToSafeZone => write!(f, "limiting to safe zone"),
        }
    }
}

/// Per-tick input to [`VolumeGovernor::evaluate`].
#[derive(Debug, Clone, Copy)]
pub struct GovernorInput {
    /// Effective level of the current requested volume.
    pub level_db: f64,
    pub session_dose: f64,
    pub allowed_secs: f64,
    pub now: Instant,
}

/// What a tick decided.
#[derive(Debug, Clone, PartialEq)]
pub struct GovernorOutcome {
    pub status: GovernorStatus,
    /// Unsmoothed remaining time until 100 % session dose.
    pub remaining_secs: f64,
    /// EMA of the remaining time, used for every policy decision.
    pub smoothed_remaining_secs: f64,
    /// Requested volume after this tick.
    pub volume_pct: f64,
    /// Whether this tick changed the requested volume.
    pub volume_changed: bool,
    /// A hard lock engaged by this tick.
    pub lock_engaged: Option<HardLock>,
    /// Whether this tick released the soft ceiling.
    pub ceiling_released: bool,
}

/// What to do about a value read back from the channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// Nothing to do.
    InSync,
    /// The external value was adopted as the new requested volume.
    Adopted(f64),
    /// The channel must be written back to this value.
    Reassert(f64),
}

/// Serializable view of the governor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorState {
    pub mode: GoverningMode,
    pub strategy: DynamicStrategy,
    pub volume_pct: f64,
    pub status: GovernorStatus,
    pub lock: Option<HardLock>,
    pub ceiling_pct: Option<f64>,
    pub limiting: bool,
    pub decay_active: bool,
    pub smoothed_remaining_secs: Option<f64>,
}

/// Volume governor. See the module docs.
#[derive(Debug, Clone)]
pub struct VolumeGovernor {
    policy: GovernorPolicy,
    mode: GoverningMode,
    volume_pct: f64,
    lock: Option<HardLock>,
    ceiling: SoftCeiling,
    limiting: bool,
    decay_active: bool,
    last_adjust: Option<Instant>,
    remaining_ema: Option<f64>,
    status: GovernorStatus,
    channel_warned: bool,
}

impl VolumeGovernor {
    pub fn new(
        policy: GovernorPolicy,
        mode: GoverningMode,
        initial_volume_pct: f64,
    ) -> GovernorResult<Self> {
        policy.tuning.validate()?;
        Ok(Self {
            policy,
            mode,
            volume_pct: clamp_percent(initial_volume_pct),
            lock: None,
            ceiling: SoftCeiling::new(),
            limiting: false,
            decay_active: false,
            last_adjust: None,
            remaining_ema: None,
            status: GovernorStatus::Normal,
            channel_warned: false,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn policy(&self) -> &GovernorPolicy {
        &self.policy
    }

    pub fn mode(&self) -> GoverningMode {
        self.mode
    }

    pub fn strategy(&self) -> DynamicStrategy {
        self.policy.strategy
    }

    /// Requested volume, the ground truth for the level computation.
    pub fn volume_pct(&self) -> f64 {
        self.volume_pct
    }

    /// Requested volume snapped to the channel quantum.
    pub fn channel_target(&self) -> f64 {
        match &self.lock {
            Some(lock) => lock.target_pct,
            None => quantize_percent(self.volume_pct, self.policy.tuning.volume_quantum_pct),
        }
    }

    pub fn lock(&self) -> Option<&HardLock> {
        self.lock.as_ref()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn ceiling(&self) -> Option<f64> {
        self.ceiling.value()
    }

    pub fn is_limiting(&self) -> bool {
        self.limiting
    }

    pub fn decay_active(&self) -> bool {
        self.decay_active
    }

    pub fn status(&self) -> GovernorStatus {
        self.status
    }

    pub fn smoothed_remaining(&self) -> Option<f64> {
        self.remaining_ema
    }

    pub fn state(&self) -> GovernorState {
        GovernorState {
            mode: self.mode,
            strategy: self.policy.strategy,
            volume_pct: self.volume_pct,
            status: self.status,
            lock: self.lock.clone(),
            ceiling_pct: self.ceiling.value(),
            limiting: self.limiting,
            decay_active: self.decay_active,
            smoothed_remaining_secs: self.remaining_ema,
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Request a new volume.
    ///
    /// Refused while hard-locked, and increases are refused while a Dynamic
    /// decay is running. With soft-lock enabled, values above the ceiling
    /// (plus the source tolerance) are clamped to it.
    pub fn request_volume(&mut self, pct: f64, source: VolumeSource) -> VolumeDecision {
        if let Some(lock) = &self.lock {
            debug!(requested = pct, target = lock.target_pct, "Volume request refused: locked");
            return VolumeDecision::Rejected {
                applied: lock.target_pct,
                reason: RejectReason::Locked(lock.reason),
            };
        }

        let requested = clamp_percent(pct);
        let tolerance = self.tolerance_for(source);

        if self.decay_active && requested > self.volume_pct + tolerance {
            debug!(requested, current = self.volume_pct, "Volume increase ignored during decay");
            return VolumeDecision::Rejected {
                applied: self.volume_pct,
                reason: RejectReason::DecayInProgress,
            };
        }

        if self.policy.softlock_enabled {
            if let Some(ceiling) = self.ceiling.exceeds(requested, tolerance) {
                debug!(requested, ceiling, "Volume request clamped to soft ceiling");
                self.volume_pct = ceiling;
                return VolumeDecision::Clamped {
                    requested,
                    applied: ceiling,
                };
            }
        }

        self.volume_pct = requested;
        VolumeDecision::Accepted { applied: requested }
    }

    /// Switch governing mode. Refused while hard-locked.
    pub fn set_mode(&mut self, mode: GoverningMode) -> GovernorResult<()> {
        if let Some(lock) = &self.lock {
            return Err(GovernorError::Locked {
                reason: lock.reason,
            });
        }
        if mode != self.mode {
            info!(from = %self.mode, to = %mode, "Governing mode changed");
        }
        self.mode = mode;
        self.reset_transient();
        self.status = GovernorStatus::Normal;
        Ok(())
    }

    /// Switch the Dynamic strategy. Allowed while locked; the lock stays.
    pub fn set_strategy(&mut self, strategy: DynamicStrategy) {
        if strategy != self.policy.strategy {
            info!(from = %self.policy.strategy, to = %strategy, "Dynamic strategy changed");
        }
        self.policy.strategy = strategy;
        self.reset_transient();
    }

    /// Replace the policy. Validated first; nothing changes on error.
    pub fn set_policy(&mut self, policy: GovernorPolicy) -> GovernorResult<()> {
        policy.tuning.validate()?;
        self.policy = policy;
        self.reset_transient();
        Ok(())
    }

    // =========================================================================
    // Hard lock
    // =========================================================================

    /// Engage a hard lock. An existing lock is kept and `None` is returned.
    pub fn engage_lock(
        &mut self,
        target_pct: f64,
        reason: LockReason,
        honor_min: bool,
        profile: &ExposureProfile,
    ) -> Option<HardLock> {
        if self.lock.is_some() {
            return None;
        }
        let lock = HardLock::new(target_pct, profile.min_enforced_volume, honor_min, reason);
        warn!(target = lock.target_pct, reason = %reason, "Volume hard-locked");
        self.volume_pct = lock.target_pct;
        self.status = GovernorStatus::Locked(reason);
        self.lock = Some(lock.clone());
        Some(lock)
    }

    /// Release the hard lock, returning it if one was engaged.
    pub fn unlock(&mut self) -> Option<HardLock> {
        let released = self.lock.take();
        if let Some(lock) = &released {
            info!(reason = %lock.reason, "Volume unlocked");
            self.status = GovernorStatus::Normal;
        }
        released
    }

    /// React to an accumulator event. Dose-threshold signals lock at the
    /// minimum enforced volume when hard locking is enabled.
    pub fn on_exposure_event(
        &mut self,
        event: &ExposureEvent,
        profile: &ExposureProfile,
    ) -> Option<HardLock> {
        if !event.requests_lock() || !self.policy.hard_lock_enabled {
            return None;
        }
        let reason = match event {
            ExposureEvent::DailyLimit { .. } => LockReason::DailyLimit,
            _ => LockReason::SessionLimit,
        };
        self.engage_lock(profile.min_enforced_volume, reason, true, profile)
    }

    /// Lock enforcer check. Returns the target to write when the observed
    /// channel value has drifted beyond the lock tolerance.
    pub fn enforce_lock(&self, observed_pct: f64) -> Option<f64> {
        let lock = self.lock.as_ref()?;
        lock.drifted(observed_pct, self.policy.tuning.lock_tolerance_pct)
            .then_some(lock.target_pct)
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Evaluate the governing policy for one tick.
    pub fn evaluate(&mut self, profile: &ExposureProfile, input: GovernorInput) -> GovernorOutcome {
        let tuning = self.policy.tuning;
        let remaining = if input.session_dose < 1.0 {
            (1.0 - input.session_dose) * input.allowed_secs
        } else {
            0.0
        };
        let smoothed = match self.remaining_ema {
            None => remaining,
            Some(prev) => tuning.ema_alpha * remaining + (1.0 - tuning.ema_alpha) * prev,
        };
        self.remaining_ema = Some(smoothed);

        let before = self.volume_pct;
        let mut lock_engaged = None;
        let mut ceiling_released = false;

        if let Some(lock) = &self.lock {
            self.status = GovernorStatus::Locked(lock.reason);
            self.volume_pct = lock.target_pct;
        } else if input.session_dose >= 1.0 {
            self.status = GovernorStatus::Normal;
        } else {
            match self.mode {
                GoverningMode::Fixed => {
                    lock_engaged = self.evaluate_fixed(profile, smoothed);
                }
                GoverningMode::Dynamic => match self.policy.strategy {
                    DynamicStrategy::Reserve => {
                        ceiling_released = self.evaluate_reserve(&input, smoothed);
                    }
                    DynamicStrategy::SafeZone => {
                        ceiling_released = self.evaluate_safe_zone(profile, &input);
                    }
                },
            }
        }

        if ceiling_released {
            info!("Soft ceiling released");
        }

        GovernorOutcome {
            status: self.status,
            remaining_secs: remaining,
            smoothed_remaining_secs: smoothed,
            volume_pct: self.volume_pct,
            volume_changed: (self.volume_pct - before).abs() > f64::EPSILON,
            lock_engaged,
            ceiling_released,
        }
    }

    fn evaluate_fixed(&mut self, profile: &ExposureProfile, smoothed: f64) -> Option<HardLock> {
        if smoothed > self.policy.tuning.fixed_cut_margin_secs {
            self.status = GovernorStatus::Normal;
            return None;
        }

        let target = level_to_percent(profile.safe_level_db(), profile);
        let cut = self.volume_pct.min(target);
        if cut < self.volume_pct {
            info!(from = self.volume_pct, to = cut, "Remaining time exhausted, cutting to safe zone");
        }
        self.volume_pct = cut;
        self.status = GovernorStatus::AutoCut;

        if self.policy.lock_on_autoadjust {
            self.engage_lock(cut, LockReason::AutoCut, true, profile)
        } else {
            None
        }
    }

    fn evaluate_reserve(&mut self, input: &GovernorInput, smoothed: f64) -> bool {
        let tuning = self.policy.tuning;
        let reserve_target = tuning.reserve_target(input.allowed_secs);
        let lower = reserve_target - tuning.hysteresis_secs;
        let upper = reserve_target + tuning.hysteresis_secs;

        if !self.limiting && smoothed < lower {
            self.limiting = true;
            debug!(reserve_target, smoothed, "Reserve limiting engaged");
            if self.policy.softlock_enabled {
                self.ceiling
                    .capture(quantize_percent(self.volume_pct, tuning.volume_quantum_pct));
            }
        } else if self.limiting && smoothed > upper {
            self.limiting = false;
            debug!(reserve_target, smoothed, "Reserve limiting disengaged");
        }

        if self.limiting {
            if self.adjustment_due(input.now) {
                let step = tuning.reserve_step(reserve_target - smoothed);
                let next = clamp_percent(self.volume_pct - step);
                if next < self.volume_pct - RESERVE_DECAY_EPSILON_PCT {
                    self.decay_active = true;
                    self.volume_pct = next;
                    if self.policy.softlock_enabled {
                        self.ceiling.lower(next);
                    }
                }
                self.last_adjust = Some(input.now);
            }
            self.status = GovernorStatus::Limiting;
            return false;
        }

        self.decay_active = false;
        self.status = GovernorStatus::Normal;
        if !self.policy.softlock_enabled {
            return false;
        }
        if smoothed > upper {
            self.ceiling.tick_release(input.now, tuning.release_delay())
        } else {
            self.ceiling.hold();
            false
        }
    }

    fn evaluate_safe_zone(&mut self, profile: &ExposureProfile, input: &GovernorInput) -> bool {
        let tuning = self.policy.tuning;

        if zone_from_level(input.level_db, profile) == RiskZone::Safe {
            self.limiting = false;
            self.decay_active = false;
            self.status = GovernorStatus::Normal;
            return self.policy.softlock_enabled
                && self.ceiling.tick_release(input.now, tuning.release_delay());
        }

        if !self.limiting {
            self.limiting = true;
            debug!(level_db = input.level_db, "Safe-zone limiting engaged");
            if self.policy.softlock_enabled {
                self.ceiling
                    .capture(quantize_percent(self.volume_pct, tuning.volume_quantum_pct));
            }
        }
        self.ceiling.hold();

        if self.adjustment_due(input.now) {
            let step = tuning.level_step(input.level_db);
            let next = (self.volume_pct - step).max(profile.min_enforced_volume);
            if (self.volume_pct - next).abs() >= MIN_EFFECTIVE_STEP_PCT {
                self.decay_active = true;
                self.volume_pct = next;
                if self.policy.softlock_enabled {
                    self.ceiling.lower(next);
                }
            }
            self.last_adjust = Some(input.now);
        }
        self.status = GovernorStatus::LimitingToSafeZone;
        false
    }

    fn tolerance_for(&self, source: VolumeSource) -> f64 {
        match source {
            VolumeSource::User => self.policy.tuning.user_tolerance_pct,
            VolumeSource::External => self.policy.tuning.external_tolerance_pct,
        }
    }

    fn adjustment_due(&self, now: Instant) -> bool {
        match self.last_adjust {
            None => true,
            Some(last) => {
                now.saturating_duration_since(last) >= self.policy.tuning.adjust_interval()
            }
        }
    }

    // =========================================================================
    // Channel reconciliation
    // =========================================================================

    /// Reconcile a value read back from the channel.
    ///
    /// A lock wins over everything. Otherwise values above the soft ceiling
    /// are pushed back, increases during decay are ignored, and any other
    /// difference beyond the adopt threshold becomes the new request.
    pub fn reconcile_external(&mut self, observed_pct: f64) -> Reconciliation {
        let tuning = self.policy.tuning;
        let observed = quantize_percent(observed_pct, tuning.volume_quantum_pct);

        if let Some(target) = self.enforce_lock(observed) {
            self.volume_pct = target;
            return Reconciliation::Reassert(target);
        }
        if self.lock.is_some() {
            return Reconciliation::InSync;
        }

        if self.policy.softlock_enabled {
            if let Some(ceiling) = self.ceiling.exceeds(observed, tuning.external_tolerance_pct) {
                debug!(observed, ceiling, "External volume above soft ceiling");
                self.volume_pct = ceiling;
                return Reconciliation::Reassert(ceiling);
            }
        }

        if self.decay_active && observed > self.volume_pct + tuning.user_tolerance_pct {
            return Reconciliation::InSync;
        }

        if (observed - self.volume_pct).abs() > tuning.adopt_threshold_pct {
            debug!(observed, previous = self.volume_pct, "Adopting external volume change");
            self.volume_pct = observed;
            return Reconciliation::Adopted(observed);
        }

        Reconciliation::InSync
    }

    /// Record a channel failure. Returns `true` the first time so the caller
    /// can surface a single capability warning.
    pub fn note_channel_failure(&mut self, error: &ChannelError) -> bool {
        if self.channel_warned {
            debug!(error = %error, "Volume channel failure");
            return false;
        }
        warn!(error = %error, "Volume channel unavailable, continuing without enforcement");
        self.channel_warned = true;
        true
    }

    // =========================================================================
    // Resets
    // =========================================================================

    /// Clear ceiling, limiting and decay flags and the adjustment timer.
    pub fn reset_transient(&mut self) {
        self.ceiling.clear();
        self.limiting = false;
        self.decay_active = false;
        self.last_adjust = None;
    }

    /// Session reset: transient state, the EMA and the hard lock.
    pub fn reset_session(&mut self) -> Option<HardLock> {
        self.reset_transient();
        self.remaining_ema = None;
        let released = self.unlock();
        self.status = GovernorStatus::Normal;
        released
    }

    /// Mark the status as paused. Locked status takes precedence.
    pub fn mark_paused(&mut self) {
        if self.lock.is_none() {
            self.status = GovernorStatus::Paused;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use earguard_exposure::{allowed_duration_seconds, percent_to_level};

    fn profile() -> ExposureProfile {
        ExposureProfile::niosh()
    }

    fn governor(mode: GoverningMode, volume: f64) -> VolumeGovernor {
        VolumeGovernor::new(GovernorPolicy::default(), mode, volume).unwrap()
    }

    fn input(level_db: f64, session_dose: f64, allowed_secs: f64, now: Instant) -> GovernorInput {
        GovernorInput {
            level_db,
            session_dose,
            allowed_secs,
            now,
        }
    }

    #[test]
    fn accepts_requests_when_unconstrained() {
        let mut g = governor(GoverningMode::Fixed, 30.0);
        let d = g.request_volume(45.0, VolumeSource::User);
        assert_eq!(d, VolumeDecision::Accepted { applied: 45.0 });
        assert_eq!(g.volume_pct(), 45.0);

        let d = g.request_volume(140.0, VolumeSource::User);
        assert_eq!(d.applied(), 100.0);
    }

    #[test]
    fn session_limit_locks_at_min_enforced_and_rejects_requests() {
        let p = profile();
        let mut g = governor(GoverningMode::Fixed, 60.0);
        let lock = g.on_exposure_event(&ExposureEvent::SessionFullDose, &p).unwrap();
        assert_eq!(lock.target_pct, p.min_enforced_volume);
        assert_eq!(lock.reason, LockReason::SessionLimit);
        assert_eq!(g.volume_pct(), 5.0);

        let d = g.request_volume(40.0, VolumeSource::User);
        assert!(d.is_rejected());
        assert_eq!(d.applied(), 5.0);
        assert_eq!(g.volume_pct(), 5.0);
        assert_eq!(g.channel_target(), 5.0);
    }

    #[test]
    fn lock_not_engaged_when_hard_lock_disabled() {
        let p = profile();
        let policy = GovernorPolicy {
            hard_lock_enabled: false,
            ..Default::default()
        };
        let mut g = VolumeGovernor::new(policy, GoverningMode::Fixed, 60.0).unwrap();
        assert!(g
            .on_exposure_event(&ExposureEvent::DailyLimit { daily_pct: 100.0 }, &p)
            .is_none());
        assert!(!g.is_locked());
    }

    #[test]
    fn second_lock_keeps_first() {
        let p = profile();
        let mut g = governor(GoverningMode::Fixed, 60.0);
        g.engage_lock(20.0, LockReason::Manual, true, &p).unwrap();
        assert!(g.engage_lock(5.0, LockReason::SessionLimit, true, &p).is_none());
        assert_eq!(g.lock().unwrap().target_pct, 20.0);
    }

    #[test]
    fn mode_switch_refused_while_locked() {
        let p = profile();
        let mut g = governor(GoverningMode::Fixed, 60.0);
        g.engage_lock(5.0, LockReason::SessionLimit, true, &p);
        assert_eq!(
            g.set_mode(GoverningMode::Dynamic),
            Err(GovernorError::Locked {
                reason: LockReason::SessionLimit
            })
        );
        g.unlock();
        assert!(g.set_mode(GoverningMode::Dynamic).is_ok());
        assert_eq!(g.mode(), GoverningMode::Dynamic);
    }

    #[test]
    fn enforcer_reasserts_on_drift() {
        let p = profile();
        let mut g = governor(GoverningMode::Fixed, 60.0);
        assert_eq!(g.enforce_lock(70.0), None);
        g.engage_lock(5.0, LockReason::SessionLimit, true, &p);
        assert_eq!(g.enforce_lock(5.4), None);
        assert_eq!(g.enforce_lock(40.0), Some(5.0));
    }

    #[test]
    fn fixed_mode_cuts_to_safe_zone_and_locks() {
        let p = profile();
        let policy = GovernorPolicy {
            tuning: crate::DynamicTuning {
                fixed_cut_margin_secs: 60.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut g = VolumeGovernor::new(policy, GoverningMode::Fixed, 90.0).unwrap();
        let level = percent_to_level(90.0, &p);
        let allowed = allowed_duration_seconds(level, &p);
        let now = Instant::now();

        let out = g.evaluate(&p, input(level, 0.5, allowed, now));
        assert_eq!(out.status, GovernorStatus::Normal);
        assert!(!out.volume_changed);

        // The EMA lags, so keep feeding exhausted remaining time.
        let mut engaged = None;
        for _ in 0..50 {
            let out = g.evaluate(&p, input(level, 0.999_99, allowed, now));
            if out.lock_engaged.is_some() {
                assert!(out.volume_changed);
                assert_eq!(out.status, GovernorStatus::Locked(LockReason::AutoCut));
                engaged = out.lock_engaged;
                break;
            }
        }
        let lock = engaged.expect("auto-cut should lock");
        let safe = level_to_percent(p.safe_level_db(), &p);
        assert!((lock.target_pct - safe).abs() < 1e-9);
        assert!((g.volume_pct() - safe).abs() < 1e-9);
        assert_eq!(lock.reason, LockReason::AutoCut);
    }

    #[test]
    fn fixed_cut_never_raises_volume() {
        let p = profile();
        let policy = GovernorPolicy {
            lock_on_autoadjust: false,
            tuning: crate::DynamicTuning {
                fixed_cut_margin_secs: 1.0e9,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut g = VolumeGovernor::new(policy, GoverningMode::Fixed, 20.0).unwrap();
        let out = g.evaluate(&p, input(51.0, 0.1, 1000.0, Instant::now()));
        assert_eq!(out.status, GovernorStatus::AutoCut);
        assert_eq!(g.volume_pct(), 20.0);
        assert!(!g.is_locked());
    }

    #[test]
    fn reserve_limits_below_lower_band() {
        let p = profile();
        let mut g = governor(GoverningMode::Dynamic, 60.0);
        let t0 = Instant::now();

        // allowed 1800 s -> reserve target 600 s, lower band 510 s.
        let out = g.evaluate(&p, input(80.0, 1.0 - 520.0 / 1800.0, 1800.0, t0));
        assert_eq!(out.status, GovernorStatus::Normal);
        assert!(!g.is_limiting());

        g.reset_session();
        let out = g.evaluate(&p, input(80.0, 1.0 - 500.0 / 1800.0, 1800.0, t0));
        assert_eq!(out.status, GovernorStatus::Limiting);
        assert!(g.is_limiting());
        assert_eq!(g.ceiling().map(|c| c <= 60.0), Some(true));
        // deficit 100 s -> medium step
        assert!((g.volume_pct() - 59.5).abs() < 1e-9);
        assert!(g.decay_active());
    }

    #[test]
    fn reserve_respects_adjust_interval() {
        let p = profile();
        let mut g = governor(GoverningMode::Dynamic, 60.0);
        let t0 = Instant::now();
        let dose = 1.0 - 200.0 / 1800.0;

        g.evaluate(&p, input(80.0, dose, 1800.0, t0));
        let after_first = g.volume_pct();
        g.evaluate(&p, input(80.0, dose, 1800.0, t0 + Duration::from_millis(200)));
        assert_eq!(g.volume_pct(), after_first);
        g.evaluate(&p, input(80.0, dose, 1800.0, t0 + Duration::from_millis(600)));
        assert!(g.volume_pct() < after_first);
    }

    #[test]
    fn reserve_blocks_increases_and_releases_after_delay() {
        let p = profile();
        let mut g = governor(GoverningMode::Dynamic, 60.0);
        let t0 = Instant::now();
        g.evaluate(&p, input(80.0, 1.0 - 400.0 / 1800.0, 1800.0, t0));
        assert!(g.is_limiting());

        let d = g.request_volume(80.0, VolumeSource::User);
        assert_eq!(d, VolumeDecision::Rejected {
            applied: g.volume_pct(),
            reason: RejectReason::DecayInProgress,
        });

        let ceiling = g.ceiling().unwrap();

        // Plenty of time left: limiting stops, the ceiling stays for the
        // release delay.
        let relaxed = |secs: u64| input(60.0, 0.0, 28_800.0, t0 + Duration::from_secs(secs));
        let out = g.evaluate(&p, relaxed(0));
        assert!(!g.is_limiting());
        assert!(!out.ceiling_released);
        let d = g.request_volume(90.0, VolumeSource::User);
        assert_eq!(d, VolumeDecision::Clamped {
            requested: 90.0,
            applied: ceiling,
        });

        assert!(!g.evaluate(&p, relaxed(10)).ceiling_released);
        assert!(g.evaluate(&p, relaxed(20)).ceiling_released);
        assert_eq!(g.ceiling(), None);

        let d = g.request_volume(90.0, VolumeSource::User);
        assert_eq!(d, VolumeDecision::Accepted { applied: 90.0 });
    }

    #[test]
    fn ceiling_clamps_requests_until_released() {
        let p = profile();
        let mut g = governor(GoverningMode::Dynamic, 60.0);
        let t0 = Instant::now();
        g.evaluate(&p, input(80.0, 1.0 - 400.0 / 1800.0, 1800.0, t0));
        let ceiling = g.ceiling().unwrap();

        // Decay finished but the ceiling remains.
        g.reset_transient();
        g.ceiling.capture(ceiling);
        let d = g.request_volume(90.0, VolumeSource::User);
        assert_eq!(d, VolumeDecision::Clamped {
            requested: 90.0,
            applied: ceiling,
        });

        let d = g.request_volume(ceiling - 10.0, VolumeSource::User);
        assert_eq!(d, VolumeDecision::Accepted { applied: ceiling - 10.0 });
    }

    #[test]
    fn external_requests_get_wider_ceiling_slack() {
        let mut g = governor(GoverningMode::Dynamic, 59.0);
        g.ceiling.capture(59.0);

        let d = g.request_volume(59.4, VolumeSource::External);
        assert_eq!(d, VolumeDecision::Accepted { applied: 59.4 });

        let d = g.request_volume(59.4, VolumeSource::User);
        assert_eq!(d, VolumeDecision::Clamped {
            requested: 59.4,
            applied: 59.0,
        });
        assert_eq!(g.volume_pct(), 59.0);
    }

    #[test]
    fn safe_zone_releases_ceiling_after_continuous_safe_hold() {
        let p = profile();
        let mut g = governor(GoverningMode::Dynamic, 59.0);
        g.set_strategy(DynamicStrategy::SafeZone);
        g.ceiling.capture(59.0);
        let safe_level = p.safe_level_db() - 10.0;
        let t0 = Instant::now();

        let out = g.evaluate(&p, input(safe_level, 0.1, 10_000.0, t0));
        assert!(!out.ceiling_released);
        let out = g.evaluate(&p, input(safe_level, 0.1, 10_000.0, t0 + Duration::from_secs(10)));
        assert!(!out.ceiling_released);
        assert_eq!(g.ceiling(), Some(59.0));

        let out = g.evaluate(&p, input(safe_level, 0.1, 10_000.0, t0 + Duration::from_secs(22)));
        assert!(out.ceiling_released);
        assert_eq!(g.ceiling(), None);
        assert_eq!(out.status, GovernorStatus::Normal);
    }

    #[test]
    fn safe_zone_release_timer_restarts_when_level_rises() {
        let p = profile();
        let mut g = governor(GoverningMode::Dynamic, 59.0);
        g.set_strategy(DynamicStrategy::SafeZone);
        g.ceiling.capture(59.0);
        let safe_level = p.safe_level_db() - 10.0;
        let t0 = Instant::now();

        g.evaluate(&p, input(safe_level, 0.1, 10_000.0, t0));
        g.evaluate(&p, input(p.max_db, 0.1, 10_000.0, t0 + Duration::from_secs(15)));
        g.evaluate(&p, input(safe_level, 0.1, 10_000.0, t0 + Duration::from_secs(16)));
        let out = g.evaluate(&p, input(safe_level, 0.1, 10_000.0, t0 + Duration::from_secs(25)));
        assert!(!out.ceiling_released);
        assert!(g.ceiling().is_some());
    }

    #[test]
    fn fixed_mode_default_margin_only_locks_at_full_dose() {
        let p = profile();
        let mut g = governor(GoverningMode::Fixed, 90.0);
        let level = percent_to_level(90.0, &p);
        let allowed = allowed_duration_seconds(level, &p);
        let now = Instant::now();

        for _ in 0..200 {
            let out = g.evaluate(&p, input(level, 0.999_99, allowed, now));
            assert!(out.lock_engaged.is_none());
            assert!(!out.volume_changed);
        }
        assert!(!g.is_locked());
    }

    #[test]
    fn safe_zone_steps_down_to_min_enforced() {
        let p = profile();
        let mut g = governor(GoverningMode::Dynamic, 100.0);
        g.set_strategy(DynamicStrategy::SafeZone);
        let t0 = Instant::now();

        let mut now = t0;
        for _ in 0..400 {
            let level = percent_to_level(g.volume_pct(), &p);
            g.evaluate(&p, input(level, 0.1, 10_000.0, now));
            now += Duration::from_millis(600);
        }
        let safe = level_to_percent(p.safe_level_db(), &p);
        assert!(g.volume_pct() < safe);
        assert!(g.volume_pct() >= p.min_enforced_volume);
        assert_eq!(g.status(), GovernorStatus::Normal);
    }

    #[test]
    fn safe_zone_step_scales_with_level() {
        let p = profile();
        let mut g = governor(GoverningMode::Dynamic, 100.0);
        g.set_strategy(DynamicStrategy::SafeZone);
        let out = g.evaluate(&p, input(95.0, 0.1, 10_000.0, Instant::now()));
        assert_eq!(out.status, GovernorStatus::LimitingToSafeZone);
        assert_eq!(g.volume_pct(), 99.0);

        let mut g = governor(GoverningMode::Dynamic, 80.0);
        g.set_strategy(DynamicStrategy::SafeZone);
        g.evaluate(&p, input(86.0, 0.1, 10_000.0, Instant::now()));
        assert_eq!(g.volume_pct(), 79.75);
    }

    #[test]
    fn mode_switch_resets_transient_state() {
        let p = profile();
        let mut g = governor(GoverningMode::Dynamic, 60.0);
        g.evaluate(&p, input(80.0, 1.0 - 400.0 / 1800.0, 1800.0, Instant::now()));
        assert!(g.is_limiting());
        g.set_mode(GoverningMode::Fixed).unwrap();
        assert!(!g.is_limiting());
        assert!(!g.decay_active());
        assert_eq!(g.ceiling(), None);
    }

    #[test]
    fn reconcile_reasserts_lock_then_ceiling() {
        let p = profile();
        let mut g = governor(GoverningMode::Dynamic, 60.0);
        g.engage_lock(5.0, LockReason::SessionLimit, true, &p);
        assert_eq!(g.reconcile_external(50.0), Reconciliation::Reassert(5.0));
        assert_eq!(g.reconcile_external(5.0), Reconciliation::InSync);
        g.unlock();

        g.ceiling.capture(30.0);
        assert_eq!(g.reconcile_external(45.0), Reconciliation::Reassert(30.0));
        assert_eq!(g.volume_pct(), 30.0);
    }

    #[test]
    fn reconcile_adopts_large_external_changes() {
        let mut g = governor(GoverningMode::Fixed, 40.0);
        assert_eq!(g.reconcile_external(40.6), Reconciliation::InSync);
        assert_eq!(g.reconcile_external(55.2), Reconciliation::Adopted(55.0));
        assert_eq!(g.volume_pct(), 55.0);
    }

    #[test]
    fn reconcile_ignores_increase_during_decay() {
        let p = profile();
        let mut g = governor(GoverningMode::Dynamic, 60.0);
        g.evaluate(&p, input(80.0, 1.0 - 100.0 / 1800.0, 1800.0, Instant::now()));
        assert!(g.decay_active());
        let before = g.volume_pct();
        g.ceiling.clear();
        assert_eq!(g.reconcile_external(75.0), Reconciliation::InSync);
        assert_eq!(g.volume_pct(), before);
    }

    #[test]
    fn channel_warning_fires_once() {
        let mut g = governor(GoverningMode::Fixed, 40.0);
        assert!(g.note_channel_failure(&ChannelError::Unavailable));
        assert!(!g.note_channel_failure(&ChannelError::Unavailable));
    }

    #[test]
    fn reset_session_unlocks() {
        let p = profile();
        let mut g = governor(GoverningMode::Fixed, 40.0);
        g.engage_lock(5.0, LockReason::SessionLimit, true, &p);
        assert!(g.reset_session().is_some());
        assert!(!g.is_locked());
        assert_eq!(g.status(), GovernorStatus::Normal);
    }
}
