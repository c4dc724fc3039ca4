//! # Sampling Tick Statistics
//!
//! Timing of each sampling tick against the period budget.
//!
//! The sampling period is long (seconds), so a late tick here means the
//! position source is slow, not that the scheduler jittered.

use std::time::Duration;

use skywatch_core::timing::as_micros_u64;

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Minimum tick duration observed.
    pub min_tick_us: u64,
    /// Maximum tick duration observed.
    pub max_tick_us: u64,
    /// Average tick duration (rolling).
    pub avg_tick_us: u64,
    /// Number of late ticks (took longer than budget).
    pub late_ticks: u64,
    /// Total ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    /// Fresh statistics.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: 0,
            late_ticks: 0,
            total_ticks: 0,
        }
    }

    /// Records one tick that took `duration` against `budget`.
    pub fn record(&mut self, duration: Duration, budget: Duration) {
        let duration_us = as_micros_u64(duration);

        self.min_tick_us = self.min_tick_us.min(duration_us);
        self.max_tick_us = self.max_tick_us.max(duration_us);

        // Rolling average, seeded by the first sample
        self.avg_tick_us = if self.total_ticks == 0 {
            duration_us
        } else {
            (self.avg_tick_us.saturating_mul(15).saturating_add(duration_us)) / 16
        };
        self.total_ticks += 1;

        if duration > budget {
            self.late_ticks += 1;
        }
    }

    /// Resets statistics.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for TickStats {
    fn default() -> Self {
        Self::new()
    }
}
