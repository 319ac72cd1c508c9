//! Session report commands

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;

use earguard_report::{SessionReport, SessionSummary};

use crate::output::{print_info, print_success, print_table, print_warning, summary_rows};

/// Report subcommands
#[derive(Subcommand)]
pub enum ReportCommands {
    /// Print the summary of a saved JSON report
    Summary {
        /// Report written by `earguard run --report`
        path: PathBuf,
    },

    /// Convert a saved JSON report to CSV
    Csv {
        /// Report written by `earguard run --report`
        path: PathBuf,

        /// CSV output path
        #[arg(short, long)]
        output: PathBuf,
    },
}

/// Execute a report command
pub fn execute(command: &ReportCommands) -> anyhow::Result<()> {
    match command {
        ReportCommands::Summary { path } => {
            let report = load(path)?;
            print_info(&format!(
                "Profile {} | generated {}",
                report.profile,
                report.generated_at.format("%Y-%m-%d %H:%M:%S")
            ));
            match SessionSummary::from_samples(&report.samples) {
                Ok(summary) => print_table(summary_rows(&summary)),
                Err(_) => print_warning("Report has no samples"),
            }
            Ok(())
        }

        ReportCommands::Csv { path, output } => {
            let report = load(path)?;
            report.write_csv(output)?;
            print_success(&format!(
                "{} samples written to {}",
                report.samples.len(),
                output.display()
            ));
            Ok(())
        }
    }
}

fn load(path: &PathBuf) -> anyhow::Result<SessionReport> {
    SessionReport::read_json(path).with_context(|| format!("failed to read {}", path.display()))
}
