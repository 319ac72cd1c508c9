//! CSV and JSON report export.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::info;

use earguard_exposure::round_percent_display;

use crate::error::ReportResult;
use crate::sample::ExposureSample;
use crate::summary::SessionSummary;

/// Header row of the CSV export.
pub const CSV_HEADER: &str =
    "timestamp,session_elapsed_s,mode,volume_pct,level_db,dose,zone,daily_dose";

/// A full session report: header information, summary and the raw history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub generated_at: DateTime<Local>,
    /// Human-readable profile, e.g. `85 dB / 8h (3 dB)`.
    pub profile: String,
    /// `None` when the session has no samples.
    pub summary: Option<SessionSummary>,
    pub samples: Vec<ExposureSample>,
}

impl SessionReport {
    pub fn new(profile: impl Into<String>, samples: Vec<ExposureSample>) -> Self {
        Self {
            generated_at: Local::now(),
            profile: profile.into(),
            summary: SessionSummary::from_samples(&samples).ok(),
            samples,
        }
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> ReportResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!(path = %path.display(), points = self.samples.len(), "JSON report written");
        Ok(())
    }

    /// Write the history as CSV.
    pub fn write_csv(&self, path: &Path) -> ReportResult<()> {
        let file = fs::File::create(path)?;
        let mut out = BufWriter::new(file);
        write_csv(&mut out, &self.samples)?;
        out.flush()?;
        info!(path = %path.display(), points = self.samples.len(), "CSV report written");
        Ok(())
    }

    /// Load a report previously written with [`SessionReport::write_json`].
    pub fn read_json(path: &Path) -> ReportResult<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Write `samples` as CSV rows, header first. Volume is rounded half-up to
/// whole percent.
pub fn write_csv<W: Write>(out: &mut W, samples: &[ExposureSample]) -> ReportResult<()> {
    writeln!(out, "{CSV_HEADER}")?;
    for s in samples {
        writeln!(
            out,
            "{},{:.1},{},{},{:.2},{:.4},{},{:.4}",
            s.timestamp.format("%Y-%m-%dT%H:%M:%S"),
            s.session_elapsed_secs,
            s.mode,
            round_percent_display(s.volume_pct),
            s.level_db,
            s.dose,
            s.zone,
            s.daily_dose,
        )?;
    }
    Ok(())
}
