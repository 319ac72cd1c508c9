//! Report errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No samples were recorded in the session.
    #[error("no samples recorded")]
    Empty,
}

pub type ReportResult<T> = Result<T, ReportError>;
