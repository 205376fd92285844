//! Millisecond clocks and the presentation stopwatch.
//!
//! The presentation engine never reads wall time directly. It asks a [`Clock`]
//! so tests can drive time with [`ManualClock`] and assert exact group
//! transitions from synthetic ticks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of millisecond timestamps.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// Wall clock anchored to the Unix epoch at construction, advanced by a
/// monotonic [`Instant`] so timestamps never go backwards.
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch_ms: u64,
    origin: Instant,
}

impl SystemClock {
    /// Create a clock reading the current wall time.
    pub fn new() -> Self {
        let epoch_ms = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        Self {
            epoch_ms,
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.epoch_ms.saturating_add(elapsed)
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock starting at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Move time forward by `ms`.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Stopwatch measuring elapsed presentation time.
///
/// After [`stop`](Timer::stop) the elapsed time is frozen at the stop instant.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    started_at: Option<u64>,
    stopped_at: Option<u64>,
}

impl Timer {
    /// Start (or restart) at `now`.
    pub fn start(&mut self, now: u64) {
        self.started_at = Some(now);
        self.stopped_at = None;
    }

    /// Freeze at `now`. Stopping twice keeps the first stop.
    pub fn stop(&mut self, now: u64) {
        if self.started_at.is_some() && self.stopped_at.is_none() {
            self.stopped_at = Some(now);
        }
    }

    /// Whether the timer is running.
    pub fn is_running(&self) -> bool {
        self.started_at.is_some() && self.stopped_at.is_none()
    }

    /// Start timestamp, if started.
    pub fn started_at(&self) -> Option<u64> {
        self.started_at
    }

    /// Milliseconds since start, measured at `now` or at the stop instant.
    pub fn elapsed(&self, now: u64) -> u64 {
        match self.started_at {
            None => 0,
            Some(start) => self.stopped_at.unwrap_or(now).saturating_sub(start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new(1_000);
        let other = clock.clone();
        clock.advance(250);
        assert_eq!(other.now_ms(), 1_250);
        other.set(5);
        assert_eq!(clock.now_ms(), 5);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000);
    }

    #[test]
    fn test_timer_freezes_on_stop() {
        let mut timer = Timer::default();
        assert_eq!(timer.elapsed(100), 0);
        timer.start(100);
        assert!(timer.is_running());
        assert_eq!(timer.elapsed(350), 250);
        timer.stop(400);
        timer.stop(900);
        assert!(!timer.is_running());
        assert_eq!(timer.elapsed(10_000), 300);
        assert_eq!(timer.started_at(), Some(100));
    }
}
