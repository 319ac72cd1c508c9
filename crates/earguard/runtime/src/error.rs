//! Error types for the monitor runtime.

use thiserror::Error;

use earguard_exposure::ExposureError;
use earguard_governor::{ChannelError, GovernorError};

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Invalid profile or runtime configuration. The previous configuration
    /// stays in effect.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Settings could not be loaded or saved.
    #[error("settings persistence failed: {0}")]
    Persistence(String),

    #[error(transparent)]
    Governor(#[from] GovernorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The monitor task is no longer running.
    #[error("monitor stopped")]
    Stopped,
}

impl From<ExposureError> for MonitorError {
    fn from(e: ExposureError) -> Self {
        MonitorError::Configuration(e.to_string())
    }
}

impl From<config::ConfigError> for MonitorError {
    fn from(e: config::ConfigError) -> Self {
        MonitorError::Configuration(e.to_string())
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;
