//! Runtime configuration for the monitor.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Loop periods, queue sizes and file locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Governor tick period while unlocked.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Governor tick period while hard-locked.
    #[serde(default = "default_locked_tick_interval")]
    pub locked_tick_interval_ms: u64,

    /// Lock enforcer period.
    #[serde(default = "default_enforce_interval")]
    pub enforce_interval_ms: u64,

    /// How often the channel is read back for reconciliation.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_ms: u64,

    /// History sampling period.
    #[serde(default = "default_history_interval")]
    pub history_interval_ms: u64,

    /// Trailing window exposed for charting.
    #[serde(default = "default_chart_window")]
    pub chart_window_secs: f64,

    /// Difference from the restored volume above which the channel value is
    /// adopted at startup.
    #[serde(default = "default_initial_sync_threshold")]
    pub initial_sync_threshold_pct: f64,

    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Settings file. Defaults to the platform config directory.
    #[serde(default)]
    pub settings_path: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            locked_tick_interval_ms: default_locked_tick_interval(),
            enforce_interval_ms: default_enforce_interval(),
            reconcile_interval_ms: default_reconcile_interval(),
            history_interval_ms: default_history_interval(),
            chart_window_secs: default_chart_window(),
            initial_sync_threshold_pct: default_initial_sync_threshold(),
            command_capacity: default_command_capacity(),
            event_capacity: default_event_capacity(),
            settings_path: None,
        }
    }
}

fn default_tick_interval() -> u64 {
    200
}

fn default_locked_tick_interval() -> u64 {
    100
}

fn default_enforce_interval() -> u64 {
    30
}

fn default_reconcile_interval() -> u64 {
    500
}

fn default_history_interval() -> u64 {
    1000
}

fn default_chart_window() -> f64 {
    120.0
}

fn default_initial_sync_threshold() -> f64 {
    2.0
}

fn default_command_capacity() -> usize {
    64
}

fn default_event_capacity() -> usize {
    256
}

impl RuntimeConfig {
    /// Load configuration: defaults, then an optional file, then
    /// `EARGUARD_*` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&RuntimeConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("EARGUARD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Tick period for the current lock state.
    pub fn tick_period(&self, locked: bool) -> Duration {
        let ms = if locked {
            self.locked_tick_interval_ms
        } else {
            self.tick_interval_ms
        };
        Duration::from_millis(ms.max(1))
    }

    pub fn enforce_period(&self) -> Duration {
        Duration::from_millis(self.enforce_interval_ms.max(1))
    }

    pub fn reconcile_period(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn history_period(&self) -> Duration {
        Duration::from_millis(self.history_interval_ms)
    }

    /// Reject values the loops cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval_ms == 0 || self.locked_tick_interval_ms == 0 {
            return Err("tick intervals must be > 0".into());
        }
        if self.enforce_interval_ms == 0 {
            return Err("enforce_interval_ms must be > 0".into());
        }
        if self.command_capacity == 0 || self.event_capacity == 0 {
            return Err("queue capacities must be > 0".into());
        }
        Ok(())
    }
}
