//! Error types for earguard-governor.

use thiserror::Error;

use crate::lock::LockReason;

/// Failures of the external volume channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// No volume backend is present on this system.
    #[error("no volume backend available")]
    Unavailable,

    /// The backend exists but the call failed.
    #[error("volume backend error: {0}")]
    Backend(String),
}

/// Errors from governor operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GovernorError {
    /// The operation is disabled while the volume is hard-locked.
    #[error("volume is hard-locked ({reason})")]
    Locked { reason: LockReason },

    /// Tuning values are out of range.
    #[error("invalid governor configuration: {0}")]
    ConfigurationInvalid(String),

    /// External channel failure.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Result type for channel calls.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Result type for governor operations.
pub type GovernorResult<T> = Result<T, GovernorError>;
