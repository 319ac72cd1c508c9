//! Soft ceiling used by Dynamic mode.
//!
//! The ceiling only ever moves down while set. It is released after the
//! release condition has held continuously for the configured delay.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct SoftCeiling {
    value: Option<f64>,
    release_since: Option<Instant>,
}

impl SoftCeiling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Start (or tighten) the ceiling when limiting begins.
    pub fn capture(&mut self, pct: f64) {
        self.lower(pct);
        self.release_since = None;
    }

    /// `ceiling = min(ceiling, pct)`.
    pub fn lower(&mut self, pct: f64) {
        self.value = Some(match self.value {
            Some(current) => current.min(pct),
            None => pct,
        });
    }

    /// Reset the release timer because the release condition stopped holding.
    pub fn hold(&mut self) {
        self.release_since = None;
    }

    /// Record that the release condition holds at `now`. Returns `true` when
    /// this call cleared the ceiling.
    pub fn tick_release(&mut self, now: Instant, delay: Duration) -> bool {
        match self.release_since {
            None => {
                self.release_since = Some(now);
                false
            }
            Some(since) if now.saturating_duration_since(since) >= delay => {
                self.release_since = None;
                self.value.take().is_some()
            }
            Some(_) => false,
        }
    }

    /// Clamp `pct` to the ceiling, allowing `tolerance` of slack.
    /// Returns `Some(ceiling)` when `pct` is over it.
    pub fn exceeds(&self, pct: f64, tolerance: f64) -> Option<f64> {
        self.value.filter(|c| pct > c + tolerance)
    }

    pub fn clear(&mut self) {
        self.value = None;
        self.release_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_moves_down() {
        let mut c = SoftCeiling::new();
        c.capture(50.0);
        c.lower(48.0);
        c.lower(60.0);
        assert_eq!(c.value(), Some(48.0));
        c.capture(55.0);
        assert_eq!(c.value(), Some(48.0));
    }

    #[test]
    fn release_requires_continuous_delay() {
        let delay = Duration::from_secs(20);
        let t0 = Instant::now();
        let mut c = SoftCeiling::new();
        c.capture(40.0);

        assert!(!c.tick_release(t0, delay));
        assert!(!c.tick_release(t0 + Duration::from_secs(10), delay));
        c.hold();
        assert!(!c.tick_release(t0 + Duration::from_secs(15), delay));
        assert!(!c.tick_release(t0 + Duration::from_secs(30), delay));
        assert!(c.is_set());
        assert!(c.tick_release(t0 + Duration::from_secs(35), delay));
        assert!(!c.is_set());
    }

    #[test]
    fn exceeds_respects_tolerance() {
        let mut c = SoftCeiling::new();
        assert_eq!(c.exceeds(99.0, 0.0), None);
        c.capture(30.0);
        assert_eq!(c.exceeds(30.4, 0.5), None);
        assert_eq!(c.exceeds(30.6, 0.5), Some(30.0));
        assert_eq!(c.exceeds(30.02, 0.01), Some(30.0));
    }
}
