//! Monitor task and its handle.
//!
//! [`Monitor::run`] drives the tick loop and processes commands; a second
//! task re-asserts the hard lock at the enforcer period. Both share the
//! [`MonitorCore`] behind one async mutex. Presentation sinks read
//! snapshots from a watch channel and notifications from a broadcast
//! channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::time::{interval, interval_at, Interval, MissedTickBehavior};

use earguard_governor::{
    DynamicStrategy, DynamicTuning, GoverningMode, HardLock, VolumeChannel, VolumeDecision,
};
use earguard_report::ExposureSample;

use crate::command::{ConfigurationUpdate, MonitorCommand};
use crate::config::RuntimeConfig;
use crate::engine::MonitorCore;
use crate::error::{MonitorError, MonitorResult};
use crate::event::MonitorEvent;
use crate::settings::{load_or_default, PersistedSettings, SettingsStore};
use crate::snapshot::ExposureSnapshot;

/// Monotonic now, following tokio's clock so paused-time tests drive dose.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// The monitor task. Consumed by [`Monitor::run`].
pub struct Monitor {
    core: Arc<Mutex<MonitorCore>>,
    config: RuntimeConfig,
    store: Arc<dyn SettingsStore>,
    commands: mpsc::Receiver<MonitorCommand>,
    snapshot_tx: watch::Sender<Option<ExposureSnapshot>>,
    event_tx: broadcast::Sender<MonitorEvent>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Monitor {
    /// Restore settings from `store`, sync with the channel and build the
    /// task plus a handle to control it.
    pub fn new(
        config: RuntimeConfig,
        store: Arc<dyn SettingsStore>,
        channel: Arc<dyn VolumeChannel>,
        tuning: DynamicTuning,
    ) -> MonitorResult<(Self, MonitorHandle)> {
        config.validate().map_err(MonitorError::Configuration)?;

        let settings = load_or_default(store.as_ref());
        tracing::info!(
            mode = %settings.mode,
            volume = settings.volume,
            profile = %settings.profile.describe(),
            channel = channel.name(),
            "Starting exposure monitor"
        );

        let mut core = MonitorCore::new(
            settings,
            tuning,
            channel,
            config.clone(),
            now(),
            Local::now().date_naive(),
        )?;
        core.initial_sync();

        let (command_tx, commands) = mpsc::channel(config.command_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = MonitorHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            events: event_tx.clone(),
            shutdown: Arc::new(shutdown_tx),
        };
        let monitor = Self {
            core: Arc::new(Mutex::new(core)),
            config,
            store,
            commands,
            snapshot_tx,
            event_tx,
            shutdown_rx,
        };
        Ok((monitor, handle))
    }

    /// Run until shutdown is requested or every handle is dropped. The lock
    /// is released and settings are saved on the way out.
    pub async fn run(self) -> MonitorResult<PersistedSettings> {
        let Monitor {
            core,
            config,
            store,
            mut commands,
            snapshot_tx,
            event_tx,
            mut shutdown_rx,
        } = self;

        let enforcer = tokio::spawn(enforce_loop(core.clone(), config.enforce_period()));

        let mut locked = core.lock().await.is_locked();
        let mut ticks = ticker(config.tick_period(locked));
        tracing::info!(period_ms = config.tick_period(locked).as_millis() as u64, "Monitor started");

        loop {
            tokio::select! {
                _ = ticks.tick() => {
                    let mut guard = core.lock().await;
                    let snapshot = guard.tick(now(), Local::now());
                    publish(&mut guard, &event_tx);
                    snapshot_tx.send_replace(Some(snapshot));
                }
                command = commands.recv() => match command {
                    Some(command) => {
                        handle_command(&core, &store, &event_tx, command).await;
                    }
                    None => {
                        tracing::debug!("All monitor handles dropped");
                        break;
                    }
                },
                _ = shutdown_rx.changed() => break,
            }

            let now_locked = core.lock().await.is_locked();
            if now_locked != locked {
                locked = now_locked;
                let period = config.tick_period(locked);
                tracing::debug!(locked, period_ms = period.as_millis() as u64, "Tick period changed");
                ticks = ticker(period);
            }
        }

        enforcer.abort();

        let settings = {
            let mut guard = core.lock().await;
            let settings = guard.shutdown();
            publish(&mut guard, &event_tx);
            settings
        };
        persist(store.clone(), settings.clone(), &event_tx).await;
        tracing::info!("Monitor stopped");
        Ok(settings)
    }
}

async fn enforce_loop(core: Arc<Mutex<MonitorCore>>, period: Duration) {
    let mut ticks = interval(period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        core.lock().await.enforce();
    }
}

async fn handle_command(
    core: &Mutex<MonitorCore>,
    store: &Arc<dyn SettingsStore>,
    event_tx: &broadcast::Sender<MonitorEvent>,
    command: MonitorCommand,
) {
    if let MonitorCommand::ApplyConfiguration { update, reply } = command {
        let applied = {
            let mut core = core.lock().await;
            let result = core.apply_configuration(update);
            publish(&mut core, event_tx);
            result.map(|()| core.settings())
        };
        // The core lock is released before saving.
        let result = match applied {
            Ok(settings) => {
                persist(store.clone(), settings, event_tx).await;
                Ok(())
            }
            Err(e) => Err(e),
        };
        let _ = reply.send(result);
        return;
    }

    let mut core = core.lock().await;
    match command {
        MonitorCommand::RequestVolume { pct, reply } => {
            let _ = reply.send(core.request_volume(pct));
        }
        MonitorCommand::SetMode { mode, reply } => {
            let _ = reply.send(core.set_mode(mode));
        }
        MonitorCommand::SetStrategy { strategy } => core.set_strategy(strategy),
        MonitorCommand::ResetSession => core.reset_session(now()),
        // Handled above.
        MonitorCommand::ApplyConfiguration { .. } => {}
        MonitorCommand::SetPaused { paused, reply } => {
            let _ = reply.send(core.set_paused(paused));
        }
        MonitorCommand::Lock { target_pct } => core.lock(target_pct),
        MonitorCommand::Unlock { reply } => {
            let _ = reply.send(core.unlock());
        }
        MonitorCommand::History { reply } => {
            let _ = reply.send(core.history().to_vec());
        }
        MonitorCommand::ChartWindow { reply } => {
            let _ = reply.send(core.chart_window().to_vec());
        }
        MonitorCommand::Settings { reply } => {
            let _ = reply.send(core.settings());
        }
    }
    publish(&mut core, event_tx);
}

fn publish(core: &mut MonitorCore, event_tx: &broadcast::Sender<MonitorEvent>) {
    for event in core.drain_events() {
        tracing::debug!(?event, "Monitor event");
        // No subscribers is fine.
        let _ = event_tx.send(event);
    }
}

/// Save on the blocking pool. Failures are logged and broadcast, never fatal.
async fn persist(
    store: Arc<dyn SettingsStore>,
    settings: PersistedSettings,
    event_tx: &broadcast::Sender<MonitorEvent>,
) {
    let error = match tokio::task::spawn_blocking(move || store.save(&settings)).await {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e.to_string(),
        Err(e) => e.to_string(),
    };
    tracing::warn!(error = %error, "Failed to save settings");
    let _ = event_tx.send(MonitorEvent::PersistenceFailed { error });
}

/// Cloneable control surface for a running [`Monitor`].
///
/// Every request fails with [`MonitorError::Stopped`] once the monitor has
/// exited.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<MonitorCommand>,
    snapshots: watch::Receiver<Option<ExposureSnapshot>>,
    events: broadcast::Sender<MonitorEvent>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl MonitorHandle {
    async fn send(&self, command: MonitorCommand) -> MonitorResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| MonitorError::Stopped)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> MonitorCommand,
    ) -> MonitorResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(build(reply)).await?;
        rx.await.map_err(|_| MonitorError::Stopped)
    }

    pub async fn request_volume(&self, pct: f64) -> MonitorResult<VolumeDecision> {
        self.request(|reply| MonitorCommand::RequestVolume { pct, reply })
            .await
    }

    /// Switch governing mode. Fails while hard-locked.
    pub async fn set_mode(&self, mode: GoverningMode) -> MonitorResult<()> {
        self.request(|reply| MonitorCommand::SetMode { mode, reply })
            .await?
    }

    pub async fn set_strategy(&self, strategy: DynamicStrategy) -> MonitorResult<()> {
        self.send(MonitorCommand::SetStrategy { strategy }).await
    }

    pub async fn reset_session(&self) -> MonitorResult<()> {
        self.send(MonitorCommand::ResetSession).await
    }

    /// Validate, apply and persist a configuration. Nothing changes on error.
    pub async fn apply_configuration(&self, update: ConfigurationUpdate) -> MonitorResult<()> {
        self.request(|reply| MonitorCommand::ApplyConfiguration { update, reply })
            .await?
    }

    pub async fn set_paused(&self, paused: bool) -> MonitorResult<()> {
        self.request(|reply| MonitorCommand::SetPaused { paused, reply })
            .await?
    }

    pub async fn lock(&self, target_pct: f64) -> MonitorResult<()> {
        self.send(MonitorCommand::Lock { target_pct }).await
    }

    pub async fn unlock(&self) -> MonitorResult<Option<HardLock>> {
        self.request(|reply| MonitorCommand::Unlock { reply }).await
    }

    pub async fn history(&self) -> MonitorResult<Vec<ExposureSample>> {
        self.request(|reply| MonitorCommand::History { reply }).await
    }

    /// History inside the trailing chart window.
    pub async fn chart_window(&self) -> MonitorResult<Vec<ExposureSample>> {
        self.request(|reply| MonitorCommand::ChartWindow { reply })
            .await
    }

    pub async fn settings(&self) -> MonitorResult<PersistedSettings> {
        self.request(|reply| MonitorCommand::Settings { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Snapshot stream. Holds `None` until the first tick.
    pub fn snapshots(&self) -> watch::Receiver<Option<ExposureSnapshot>> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> Option<ExposureSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// Ask the monitor to stop. [`Monitor::run`] returns once it has saved
    /// settings.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once the monitor task has exited.
    pub async fn stopped(&self) {
        self.commands.closed().await
    }
}

impl std::fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}
