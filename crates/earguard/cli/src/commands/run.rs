//! Run the monitor with a console presentation sink

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use tokio::sync::broadcast;

use earguard_governor::{
    DynamicStrategy, DynamicTuning, GoverningMode, UnavailableChannel, VirtualChannel,
    VolumeChannel, VolumeDecision,
};
use earguard_report::SessionReport;
use earguard_runtime::{Monitor, MonitorHandle, RuntimeConfig, SettingsStore};

use crate::output::{
    describe_event, print_info, print_success, print_table, print_warning, status_line,
    summary_rows,
};

#[derive(Args)]
pub struct RunArgs {
    /// Stop after this many seconds (runs until Ctrl+C otherwise)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Governing mode (fixed, dynamic)
    #[arg(short, long)]
    mode: Option<GoverningMode>,

    /// Dynamic strategy (reserve, safe-zone)
    #[arg(long)]
    strategy: Option<DynamicStrategy>,

    /// Requested volume in percent
    #[arg(short, long)]
    volume: Option<f64>,

    /// Starting level of the virtual volume channel
    #[arg(long, default_value = "30")]
    channel_volume: f64,

    /// Run without a volume backend (tracking only)
    #[arg(long)]
    no_channel: bool,

    /// Seconds between status lines
    #[arg(long, default_value = "1")]
    status_every: u64,

    /// Write the session history as CSV on exit
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write the full session report as JSON on exit
    #[arg(long)]
    report: Option<PathBuf>,

    /// Neither read nor write the settings file
    #[arg(long)]
    pub ephemeral: bool,
}

/// Execute the run command
pub async fn execute(
    args: &RunArgs,
    runtime: RuntimeConfig,
    store: Arc<dyn SettingsStore>,
) -> anyhow::Result<()> {
    let channel: Arc<dyn VolumeChannel> = if args.no_channel {
        Arc::new(UnavailableChannel)
    } else {
        Arc::new(VirtualChannel::new(args.channel_volume))
    };

    let (monitor, handle) = Monitor::new(runtime, store, channel, DynamicTuning::default())
        .context("failed to start monitor")?;
    let task = tokio::spawn(monitor.run());
    let sink = tokio::spawn(console_sink(
        handle.clone(),
        Duration::from_secs(args.status_every.max(1)),
    ));

    if let Some(mode) = args.mode {
        if let Err(e) = handle.set_mode(mode).await {
            print_warning(&format!("Mode not changed: {e}"));
        }
    }
    if let Some(strategy) = args.strategy {
        handle.set_strategy(strategy).await?;
    }
    if let Some(volume) = args.volume {
        match handle.request_volume(volume).await? {
            VolumeDecision::Accepted { applied } => print_info(&format!("Volume set to {applied:.0}%")),
            VolumeDecision::Clamped { applied, .. } => {
                print_warning(&format!("Volume held at the soft ceiling ({applied:.0}%)"))
            }
            VolumeDecision::Rejected { reason, .. } => {
                print_warning(&format!("Volume request refused: {reason}"))
            }
        }
    }

    print_info("Monitoring... (Ctrl+C to stop)");
    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = shutdown_signal() => {}
        _ = deadline => {
            tracing::info!("Run duration elapsed");
        }
    }

    let history = handle.history().await?;
    handle.shutdown();
    let settings = task.await.context("monitor task panicked")??;
    sink.await.context("console task panicked")?;
    print_success("Monitor stopped, settings saved");

    let report = SessionReport::new(settings.profile.describe(), history);
    if let Some(path) = &args.csv {
        report.write_csv(path)?;
        print_success(&format!("CSV written to {}", path.display()));
    }
    if let Some(path) = &args.report {
        report.write_json(path)?;
        print_success(&format!("Report written to {}", path.display()));
    }
    if let Some(summary) = &report.summary {
        print_table(summary_rows(summary));
    }
    Ok(())
}

async fn console_sink(handle: MonitorHandle, every: Duration) {
    let mut events = handle.subscribe();
    let mut ticks = tokio::time::interval(every);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => println!("  {}", describe_event(&event)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Console fell behind monitor events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = handle.stopped() => {
                while let Ok(event) = events.try_recv() {
                    println!("  {}", describe_event(&event));
                }
                break;
            }
            _ = ticks.tick() => {
                if let Some(snapshot) = handle.latest() {
                    println!("{}", status_line(&snapshot));
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping monitor");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, stopping monitor");
        }
    }
}
