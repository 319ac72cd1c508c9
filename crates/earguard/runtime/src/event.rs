//! Notifications broadcast by the monitor.

use serde::{Deserialize, Serialize};

use earguard_exposure::ExposureEvent;
use earguard_governor::{DynamicStrategy, GoverningMode, LockReason, RejectReason};

/// One-shot notifications for the presentation sink.
///
/// Each condition is reported once per occurrence; repeated failures of the
/// same kind within a cycle are not re-broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Dose threshold or day rollover from the accumulator.
    Exposure { exposure: ExposureEvent },
    LockEngaged { target_pct: f64, reason: LockReason },
    LockReleased { reason: LockReason },
    VolumeRejected { requested: f64, reason: RejectReason },
    VolumeClamped { requested: f64, applied: f64 },
    /// The volume was changed outside the monitor and adopted.
    ExternalVolumeAdopted { pct: f64 },
    CeilingReleased,
    ModeChanged { mode: GoverningMode },
    StrategyChanged { strategy: DynamicStrategy },
    PauseChanged { paused: bool },
    SessionReset,
    ConfigurationApplied,
    /// The volume backend is missing or failing. Tracking continues.
    ChannelUnavailable { error: String },
    PersistenceFailed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_event_tag() {
        let json = serde_json::to_value(MonitorEvent::LockEngaged {
            target_pct: 5.0,
            reason: LockReason::SessionLimit,
        })
        .unwrap();
        assert_eq!(json["event"], "lock_engaged");
        assert_eq!(json["reason"], "session_limit");
    }

    #[test]
    fn exposure_event_nests_under_its_own_key() {
        let event = MonitorEvent::Exposure {
            exposure: ExposureEvent::DailyWarning { daily_pct: 81.5 },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "exposure");
        assert_eq!(json["exposure"]["kind"], "daily_warning");
        assert_eq!(json["exposure"]["daily_pct"], 81.5);

        let back: MonitorEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
