//! # Timing Helpers
//!
//! Clamp, lerp and the normalized time factor used by the interpolator.
//!
//! ```text
//!   snapshot k-1          snapshot k                       now
//!        │◄──── interval ────►│◄──────── elapsed ──────────►│
//!
//!   time_factor = clamp(elapsed / interval, 0, 1)
//! ```

use std::time::Duration;

/// Clamps `t` into `[0, 1]`.
///
/// NaN maps to `1.0` so a broken clock freezes motion at the target instead
/// of poisoning every coordinate.
#[inline]
#[must_use]
pub fn clamp_unit(t: f32) -> f32 {
    if t.is_nan() {
        return 1.0;
    }
    t.clamp(0.0, 1.0)
}

/// Linear interpolation between `a` and `b`.
///
/// Returns `a` exactly for `t <= 0` and `b` exactly for `t >= 1`.
#[inline]
#[must_use]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    if t <= 0.0 {
        a
    } else if t >= 1.0 {
        b
    } else {
        a + (b - a) * t
    }
}

/// Normalized progress through an interpolation window.
///
/// Returns `None` when the window is degenerate (zero length); callers hold
/// at the target in that case.
#[inline]
#[must_use]
pub fn time_factor(elapsed: Duration, interval: Duration) -> Option<f32> {
    if interval.is_zero() {
        return None;
    }
    let raw = elapsed.as_secs_f64() / interval.as_secs_f64();
    Some(clamp_unit(raw as f32))
}

/// Converts a duration to whole microseconds, saturating at `u64::MAX`.
#[inline]
#[must_use]
pub fn as_micros_u64(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
