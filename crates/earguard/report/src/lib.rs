//! # earguard-report
//!
//! Session history and report export. Everything here is derived from the
//! recorded [`ExposureSample`]s; no governing logic is involved.

pub mod error;
pub mod export;
pub mod sample;
pub mod summary;

pub use error::{ReportError, ReportResult};
pub use export::{write_csv, SessionReport, CSV_HEADER};
pub use sample::{recent_window, ExposureSample};
pub use summary::SessionSummary;
