//! EarGuard CLI - headless console for the exposure monitor
//!
//! Runs the monitor against a virtual volume channel, prints snapshots and
//! notifications to the terminal, and exports session reports.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use earguard_runtime::{JsonFileSettings, RuntimeConfig, SettingsStore};

mod commands;
mod output;

use commands::{profile, report, run};

/// EarGuard CLI
#[derive(Parser)]
#[command(name = "earguard")]
#[command(about = "EarGuard - noise-dose exposure tracking with a volume governor", long_about = None)]
#[command(version)]
struct Cli {
    /// Runtime configuration file path
    #[arg(short, long, env = "EARGUARD_CONFIG")]
    config: Option<String>,

    /// Settings file (defaults to the platform config directory)
    #[arg(short, long, env = "EARGUARD_SETTINGS")]
    settings: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "EARGUARD_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "EARGUARD_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Run the monitor on a virtual volume channel
    Run(run::RunArgs),

    /// Summarize or convert a saved session report
    Report {
        #[command(subcommand)]
        command: report::ReportCommands,
    },

    /// Show exposure profiles and their permitted listening times
    Profile {
        #[command(subcommand)]
        command: profile::ProfileCommands,
    },

    /// Show the persisted settings
    Settings,
}

fn init_tracing(cli: &Cli) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_env("EARGUARD_LOG")
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn settings_store(cli: &Cli, runtime: &RuntimeConfig) -> anyhow::Result<Arc<dyn SettingsStore>> {
    let path = cli
        .settings
        .clone()
        .or_else(|| runtime.settings_path.clone())
        .or_else(JsonFileSettings::default_path)
        .context("no settings location; pass --settings")?;
    Ok(Arc::new(JsonFileSettings::new(path)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let runtime = RuntimeConfig::load(cli.config.as_deref())
        .context("failed to load runtime configuration")?;

    match &cli.command {
        Commands::Run(args) => {
            let store: Arc<dyn SettingsStore> = if args.ephemeral {
                Arc::new(earguard_runtime::InMemorySettings::new())
            } else {
                settings_store(&cli, &runtime)?
            };
            run::execute(args, runtime, store).await
        }
        Commands::Report { command } => report::execute(command),
        Commands::Profile { command } => profile::execute(command),
        Commands::Settings => {
            let store = settings_store(&cli, &runtime)?;
            let settings = earguard_runtime::load_or_default(store.as_ref());
            output::print_json(&settings)
        }
    }
}
