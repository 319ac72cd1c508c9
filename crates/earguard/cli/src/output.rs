//! Output formatting utilities

use colored::*;
use serde::Serialize;
use tabled::{Table, Tabled};

use earguard_exposure::{ExposureEvent, RiskZone};
use earguard_report::SessionSummary;
use earguard_runtime::{format_hms, DailyBand, ExposureSnapshot, MonitorEvent};

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize>(data: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(data)?);
    Ok(())
}

/// Print rows as a table.
pub fn print_table<T: Tabled>(rows: Vec<T>) {
    if rows.is_empty() {
        println!("{}", "No results".dimmed());
    } else {
        println!("{}", Table::new(rows));
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue(), message);
}

fn zone_label(zone: RiskZone) -> ColoredString {
    match zone {
        RiskZone::Safe => zone.as_str().green(),
        RiskZone::Caution => zone.as_str().yellow(),
        RiskZone::Danger => zone.as_str().red().bold(),
    }
}

fn daily_label(pct: f64, band: DailyBand) -> ColoredString {
    let text = format!("{pct:.1}%");
    match band {
        DailyBand::Normal => text.normal(),
        DailyBand::Warning => text.yellow(),
        DailyBand::Blocked => text.red().bold(),
    }
}

/// One status line per snapshot.
pub fn status_line(s: &ExposureSnapshot) -> String {
    let lock = match &s.lock {
        Some(lock) => format!(" {} {:.0}%", "LOCKED".red().bold(), lock.target_pct),
        None => String::new(),
    };
    format!(
        "{} vol {:>3}% {:>5.1} dB [{}] dose {:>5.1}% [{}] daily {} left {} at-level {} {}/{}: {}{}",
        s.timestamp.format("%H:%M:%S"),
        s.display_volume,
        s.level_db,
        zone_label(s.level_zone),
        s.session_dose * 100.0,
        zone_label(s.zone),
        daily_label(s.daily_dose_pct, s.daily_band),
        s.remaining_hms(),
        s.time_at_level_hms(),
        s.mode,
        s.strategy,
        s.status,
        lock
    )
}

/// Human-readable notification line.
pub fn describe_event(event: &MonitorEvent) -> String {
    match event {
        MonitorEvent::Exposure { exposure } => match exposure {
            ExposureEvent::SessionHalfDose => "Session dose reached 50%".yellow().to_string(),
            ExposureEvent::SessionFullDose => "Session dose reached 100%".red().bold().to_string(),
            ExposureEvent::DailyWarning { daily_pct } => {
                format!("Daily dose at {daily_pct:.1}%").yellow().to_string()
            }
            ExposureEvent::DailyLimit { daily_pct } => {
                format!("Daily limit reached ({daily_pct:.1}%)").red().bold().to_string()
            }
            ExposureEvent::DayRollover { previous, current } => {
                format!("New day {current} (was {previous}), daily dose reset")
            }
        },
        MonitorEvent::LockEngaged { target_pct, reason } => {
            format!("Volume locked at {target_pct:.0}% ({reason})")
                .red()
                .bold()
                .to_string()
        }
        MonitorEvent::LockReleased { reason } => format!("Lock released ({reason})"),
        MonitorEvent::VolumeRejected { requested, reason } => {
            format!("Volume {requested:.0}% rejected: {reason}")
        }
        MonitorEvent::VolumeClamped { requested, applied } => {
            format!("Volume {requested:.0}% clamped to {applied:.0}%")
        }
        MonitorEvent::ExternalVolumeAdopted { pct } => {
            format!("System volume changed externally to {pct:.0}%")
        }
        MonitorEvent::CeilingReleased => "Soft ceiling released".to_string(),
        MonitorEvent::ModeChanged { mode } => format!("Mode: {mode}"),
        MonitorEvent::StrategyChanged { strategy } => format!("Strategy: {strategy}"),
        MonitorEvent::PauseChanged { paused } => {
            let state = if *paused { "Paused" } else { "Resumed" };
            state.to_string()
        }
        MonitorEvent::SessionReset => "Session reset".to_string(),
        MonitorEvent::ConfigurationApplied => "Configuration applied".to_string(),
        MonitorEvent::ChannelUnavailable { error } => {
            format!("Volume control unavailable ({error}); tracking only")
                .yellow()
                .to_string()
        }
        MonitorEvent::PersistenceFailed { error } => {
            format!("Could not save settings: {error}").yellow().to_string()
        }
    }
}

/// Table row for the session summary.
#[derive(Debug, Tabled)]
pub struct SummaryRow {
    pub metric: String,
    pub value: String,
}

fn optional_hms(secs: Option<f64>) -> String {
    secs.map(format_hms).unwrap_or_else(|| "-".to_string())
}

pub fn summary_rows(summary: &SessionSummary) -> Vec<SummaryRow> {
    let row = |metric: &str, value: String| SummaryRow {
        metric: metric.to_string(),
        value,
    };
    vec![
        row("Points", summary.points.to_string()),
        row("Total time", format_hms(summary.total_secs)),
        row("Average level", format!("{:.1} dB", summary.avg_level_db)),
        row("Peak level", format!("{:.1} dB", summary.peak_level_db)),
        row("Peak volume", format!("{:.0}%", summary.peak_volume_pct)),
        row("Max dose", format!("{:.1}%", summary.max_dose * 100.0)),
        row("Time to 50%", optional_hms(summary.time_to_half_dose_secs)),
        row("Time to 100%", optional_hms(summary.time_to_full_dose_secs)),
    ]
}
