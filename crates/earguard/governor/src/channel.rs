//! Abstraction over the system volume control.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{ChannelError, ChannelResult};

/// The system volume channel that the governor writes to.
///
/// Implementations must tolerate concurrent readers and writers: the
/// monitor tick loop, the lock enforcer, and the reconciler all share it.
pub trait VolumeChannel: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Current master volume in `[0, 100]`.
    fn get_percent(&self) -> ChannelResult<f64>;

    /// Set the master volume. Values are clamped to `[0, 100]`.
    fn set_percent(&self, pct: f64) -> ChannelResult<()>;
}

/// In-process channel. Stands in for a real mixer in tests and headless runs.
#[derive(Debug)]
pub struct VirtualChannel {
    level: Mutex<f64>,
    writes: AtomicUsize,
}

impl VirtualChannel {
    pub fn new(initial_pct: f64) -> Self {
        Self {
            level: Mutex::new(earguard_exposure::clamp_percent(initial_pct)),
            writes: AtomicUsize::new(0),
        }
    }

    /// Change the volume behind the governor's back, as an OS mixer or
    /// hardware knob would.
    pub fn external_change(&self, pct: f64) -> ChannelResult<()> {
        let mut level = self
            .level
            .lock()
            .map_err(|e| ChannelError::Backend(e.to_string()))?;
        *level = earguard_exposure::clamp_percent(pct);
        Ok(())
    }

    /// Number of governor writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl VolumeChannel for VirtualChannel {
    fn name(&self) -> &str {
        "virtual"
    }

    fn get_percent(&self) -> ChannelResult<f64> {
        self.level
            .lock()
            .map(|l| *l)
            .map_err(|e| ChannelError::Backend(e.to_string()))
    }

    fn set_percent(&self, pct: f64) -> ChannelResult<()> {
        let mut level = self
            .level
            .lock()
            .map_err(|e| ChannelError::Backend(e.to_string()))?;
        *level = earguard_exposure::clamp_percent(pct);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Channel for systems with no volume backend. Every call fails with
/// [`ChannelError::Unavailable`]; tracking still works without enforcement.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableChannel;

impl VolumeChannel for UnavailableChannel {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn get_percent(&self) -> ChannelResult<f64> {
        Err(ChannelError::Unavailable)
    }

    fn set_percent(&self, _pct: f64) -> ChannelResult<()> {
        Err(ChannelError::Unavailable)
    }
}
