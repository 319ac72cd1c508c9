//! Error types for earguard-exposure.

use thiserror::Error;

/// Errors raised while validating exposure configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExposureError {
    /// A profile field is outside its permitted range.
    #[error("invalid configuration: {field} {reason}")]
    ConfigurationInvalid { field: &'static str, reason: String },
}

impl ExposureError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::ConfigurationInvalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for exposure operations.
pub type ExposureResult<T> = Result<T, ExposureError>;
