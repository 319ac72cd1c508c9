//! # earguard-governor
//!
//! Volume governing for EarGuard.
//!
//! The [`VolumeGovernor`] decides what volume the system should be at,
//! given the current dose state:
//!
//! - **Fixed** mode cuts to the start of the SAFE band once the remaining
//!   listening time is exhausted, optionally hard-locking there.
//! - **Dynamic** mode steps the volume down gradually, either to protect a
//!   reserve of remaining time ([`DynamicStrategy::Reserve`]) or until the
//!   level is SAFE ([`DynamicStrategy::SafeZone`]), holding a soft ceiling
//!   that blocks increases until it is released.
//! - A **hard lock** pins the volume when a dose threshold is crossed.
//!
//! The governor never touches the system mixer itself. Callers write the
//! volumes it asks for through a [`VolumeChannel`].

pub mod ceiling;
pub mod channel;
pub mod config;
pub mod error;
pub mod governor;
pub mod lock;

pub use ceiling::SoftCeiling;
pub use channel::{UnavailableChannel, VirtualChannel, VolumeChannel};
pub use config::{DynamicStrategy, DynamicTuning, GovernorPolicy, GoverningMode};
pub use error::{ChannelError, ChannelResult, GovernorError, GovernorResult};
pub use governor::{
    GovernorInput, GovernorOutcome, GovernorState, GovernorStatus, Reconciliation, RejectReason,
    VolumeDecision, VolumeGovernor, VolumeSource,
};
pub use lock::{HardLock, LockReason};
