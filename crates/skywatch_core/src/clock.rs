//! # Clocks
//!
//! Monotonic time as a [`Duration`] since the clock's own origin.
//!
//! Sessions never read the wall clock directly; they take a `now` supplied
//! by a [`Clock`], so tests can drive time by hand with [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::timing::as_micros_u64;

/// Source of monotonic timestamps.
pub trait Clock: Send + Sync {
    /// Time elapsed since this clock's origin.
    fn now(&self) -> Duration;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// Clock backed by [`Instant`].
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
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
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock for tests and replays.
///
/// Cloning shares the underlying time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock at the given time.
    #[must_use]
    pub fn starting_at(at: Duration) -> Self {
        let clock = Self::new();
        clock.set(at);
        clock
    }

    /// Jumps to an absolute time. Going backwards is allowed.
    pub fn set(&self, at: Duration) {
        self.micros.store(as_micros_u64(at), Ordering::SeqCst);
    }

    /// Jumps to an absolute time given in milliseconds.
    pub fn set_millis(&self, ms: u64) {
        self.set(Duration::from_millis(ms));
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.micros.fetch_add(as_micros_u64(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(250));
        assert_eq!(other.now(), Duration::from_millis(250));
        other.set_millis(100);
        assert_eq!(clock.now(), Duration::from_millis(100));
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_arc_clock() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_at(Duration::from_secs(3)));
        assert_eq!(clock.now(), Duration::from_secs(3));
    }
}
