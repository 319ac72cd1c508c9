//! # earguard-runtime
//!
//! The running exposure monitor: a tick loop that integrates dose and
//! evaluates the volume governor, a lock enforcer, command handling, and
//! settings persistence.
//!
//! ```no_run
//! use std::sync::Arc;
//! use earguard_governor::{DynamicTuning, VirtualChannel};
//! use earguard_runtime::{InMemorySettings, Monitor, RuntimeConfig};
//!
//! # async fn demo() -> earguard_runtime::MonitorResult<()> {
//! let (monitor, handle) = Monitor::new(
//!     RuntimeConfig::default(),
//!     Arc::new(InMemorySettings::new()),
//!     Arc::new(VirtualChannel::new(30.0)),
//!     DynamicTuning::default(),
//! )?;
//! let task = tokio::spawn(monitor.run());
//! handle.request_volume(45.0).await?;
//! handle.shutdown();
//! # let _ = task.await;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod monitor;
pub mod settings;
pub mod snapshot;

pub use command::{ConfigurationUpdate, MonitorCommand};
pub use crate::config::RuntimeConfig;
pub use engine::MonitorCore;
pub use error::{MonitorError, MonitorResult};
pub use event::MonitorEvent;
pub use monitor::{Monitor, MonitorHandle};
pub use settings::{
    load_or_default, InMemorySettings, JsonFileSettings, PersistedSettings, SettingsStore,
    SETTINGS_FILE,
};
pub use snapshot::{format_hms, DailyBand, ExposureSnapshot};
