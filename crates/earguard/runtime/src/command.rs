//! Commands sent to the monitor task.

use tokio::sync::oneshot;

use earguard_exposure::ExposureProfile;
use earguard_governor::{DynamicStrategy, GoverningMode, HardLock, VolumeDecision};
use earguard_report::ExposureSample;

use crate::error::MonitorResult;
use crate::settings::PersistedSettings;

/// New profile and governor toggles, applied atomically.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationUpdate {
    /// Carries the minimum enforced and default volumes.
    pub profile: ExposureProfile,
    pub strategy: DynamicStrategy,
    pub softlock_enabled: bool,
    pub hard_lock_enabled: bool,
    pub lock_on_autoadjust: bool,
}

impl ConfigurationUpdate {
    /// Update that keeps the toggles of `settings` and swaps the profile.
    pub fn from_settings(settings: &PersistedSettings, profile: ExposureProfile) -> Self {
        Self {
            profile,
            strategy: settings.dynamic_strategy,
            softlock_enabled: settings.dynamic_softlock_enabled,
            hard_lock_enabled: settings.hard_lock_enabled,
            lock_on_autoadjust: settings.lock_on_autoadjust,
        }
    }
}

/// Requests processed by the monitor, one at a time, between ticks.
#[derive(Debug)]
pub enum MonitorCommand {
    RequestVolume {
        pct: f64,
        reply: oneshot::Sender<VolumeDecision>,
    },
    SetMode {
        mode: GoverningMode,
        reply: oneshot::Sender<MonitorResult<()>>,
    },
    SetStrategy {
        strategy: DynamicStrategy,
    },
    ResetSession,
    ApplyConfiguration {
        update: ConfigurationUpdate,
        reply: oneshot::Sender<MonitorResult<()>>,
    },
    SetPaused {
        paused: bool,
        reply: oneshot::Sender<MonitorResult<()>>,
    },
    /// Administrative lock at a chosen volume.
    Lock {
        target_pct: f64,
    },
    /// Administrative unlock. Replies with the released lock, if any.
    Unlock {
        reply: oneshot::Sender<Option<HardLock>>,
    },
    History {
        reply: oneshot::Sender<Vec<ExposureSample>>,
    },
    /// Samples inside the trailing chart window.
    ChartWindow {
        reply: oneshot::Sender<Vec<ExposureSample>>,
    },
    Settings {
        reply: oneshot::Sender<PersistedSettings>,
    },
}
