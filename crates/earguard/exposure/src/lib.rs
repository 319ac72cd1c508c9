//! # earguard-exposure
//!
//! Noise-dose model for volume-driven exposure tracking.
//!
//! A configured volume percentage is mapped linearly onto an effective sound
//! level, which the equal-energy rule turns into a permitted daily duration.
//! The [`ExposureAccumulator`] integrates the resulting dose rate tick by tick.
//!
//! ## Components
//!
//! - **Level mapper** ([`level`]): percentage to dB and back
//! - **Dose model** ([`dose`]): permitted duration and dose rate per level
//! - **Zone classifier** ([`zone`]): SAFE / CAUTION / DANGER bands
//! - **Profile** ([`profile`]): level range, budget anchor, presets
//! - **Accumulator** ([`accumulator`]): session/daily dose and one-shot alerts

pub mod accumulator;
pub mod dose;
pub mod error;
pub mod level;
pub mod profile;
pub mod zone;

pub use accumulator::{
    clamp_elapsed, AdvanceOutcome, AlertFlags, ExposureAccumulator, ExposureEvent, ExposureTick,
    DAILY_DOSE_CAP, MAX_TICK_ELAPSED_SECS, SESSION_DOSE_CAP,
};
pub use dose::{allowed_duration_seconds, dose_rate_per_second};
pub use error::{ExposureError, ExposureResult};
pub use level::{
    clamp_percent, level_to_percent, percent_to_level, quantize_percent, round_percent_display,
};
pub use profile::{ExposureProfile, ProfilePreset, ProfilePreview, DAILY_BASE_TIME_SECS};
pub use zone::{zone_from_dose_fraction, zone_from_level, RiskZone};
