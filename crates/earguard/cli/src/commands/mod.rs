//! CLI command implementations

pub mod profile;
pub mod report;
pub mod run;
