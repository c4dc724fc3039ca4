//! # Snapshot Interpolation
//!
//! Turns the last two samples of every entity into a smooth displayed
//! position, once per render tick.
//!
//! ```text
//!  start ●━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━● target
//!        t=0          t=0.5 ▲            t=1
//!                       displayed
//!
//!  t = clamp((now - last_snapshot_at) / inter_snapshot_interval, 0, 1)
//! ```
//!
//! The render cadence is independent of snapshot arrival. A late snapshot
//! freezes every entity at its target (t clamps to 1); there is no
//! extrapolation past the newest sample. Until two snapshots have arrived,
//! or when the last window has zero length, tracks hold at their target.

use std::time::Duration;

use skywatch_core::{timing, AxisMask, Position};

use crate::client::{EntityTrack, PresentationSink, SyncSession};

/// Displayed position of one track at time factor `t`.
///
/// `None` means the window is undefined and the track holds at its target.
#[inline]
#[must_use]
pub fn interpolate_track(track: &EntityTrack, t: Option<f32>, axes: AxisMask) -> Position {
    match t {
        Some(t) => track.start.lerp_axes(track.target, t, axes),
        None => track.target,
    }
}

impl SyncSession {
    /// Normalized progress of `now` through the current window.
    ///
    /// Always within `[0, 1]`. `None` before the second snapshot or when
    /// the last two snapshots arrived at the same instant.
    #[must_use]
    pub fn time_factor(&self, now: Duration) -> Option<f32> {
        let last = self.last_snapshot_at?;
        let interval = self.interval?;
        timing::time_factor(now.saturating_sub(last), interval)
    }

    /// Runs one render tick at `now`.
    ///
    /// Recomputes every track's displayed position, stores it, and hands it
    /// to the sink. Returns the time factor used.
    pub fn interpolate(&mut self, now: Duration, sink: &mut dyn PresentationSink) -> Option<f32> {
        let t = self.time_factor(now);
        let axes = self.axes;
        for track in self.tracks.values_mut() {
            track.displayed = interpolate_track(track, t, axes);
            sink.update(track.id, track.displayed);
        }
        tracing::trace!(?t, tracks = self.tracks.len(), "interpolation tick");
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RecordingSink;
    use crate::snapshot::Snapshot;
    use skywatch_core::EntityId;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn two_snapshot_session(from: Position, to: Position) -> SyncSession {
        let mut session = SyncSession::new();
        let mut sink = RecordingSink::new();
        session.apply_snapshot(&Snapshot::from_entries(1, ms(0), [(EntityId(1), from)]), ms(0), &mut sink);
        session.apply_snapshot(&Snapshot::from_entries(2, ms(3000), [(EntityId(1), to)]), ms(3000), &mut sink);
        session
    }

    #[test]
    fn test_no_factor_before_second_snapshot() {
        let mut session = SyncSession::new();
        let mut sink = RecordingSink::new();
        let pos = Position::new(1.0, 2.0, 3.0);
        session.apply_snapshot(&Snapshot::from_entries(1, ms(0), [(EntityId(1), pos)]), ms(0), &mut sink);

        assert_eq!(session.interpolate(ms(1000), &mut sink), None);
        assert_eq!(session.track(EntityId(1)).unwrap().displayed(), pos);
    }

    #[test]
    fn test_window_endpoints() {
        let mut session = two_snapshot_session(Position::ORIGIN, Position::new(30.0, 0.0, 0.0));
        let mut sink = RecordingSink::new();

        assert_eq!(session.interpolate(ms(3000), &mut sink), Some(0.0));
        assert_eq!(session.track(EntityId(1)).unwrap().displayed(), Position::ORIGIN);

        assert_eq!(session.interpolate(ms(6000), &mut sink), Some(1.0));
        assert_eq!(
            session.track(EntityId(1)).unwrap().displayed(),
            Position::new(30.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_overdue_freezes_at_target() {
        let mut session = two_snapshot_session(Position::ORIGIN, Position::new(30.0, 0.0, 0.0));
        let mut sink = RecordingSink::new();
        assert_eq!(session.interpolate(ms(60_000), &mut sink), Some(1.0));
        assert_eq!(sink.last_position(EntityId(1)), Some(Position::new(30.0, 0.0, 0.0)));
    }

    #[test]
    fn test_tick_before_snapshot_arrival_clamps_to_zero() {
        let session = two_snapshot_session(Position::ORIGIN, Position::new(30.0, 0.0, 0.0));
        assert_eq!(session.time_factor(ms(1000)), Some(0.0));
    }

    #[test]
    fn test_planar_axes_hold_vertical() {
        let mut session = SyncSession::with_axes(AxisMask::PLANAR);
        let mut sink = RecordingSink::new();
        session.apply_snapshot(
            &Snapshot::from_entries(1, ms(0), [(EntityId(1), Position::new(0.0, 0.0, 0.0))]),
            ms(0),
            &mut sink,
        );
        session.apply_snapshot(
            &Snapshot::from_entries(2, ms(0), [(EntityId(1), Position::new(10.0, 10.0, 8.0))]),
            ms(1000),
            &mut sink,
        );
        session.interpolate(ms(1500), &mut sink);
        assert_eq!(
            session.track(EntityId(1)).unwrap().displayed(),
            Position::new(5.0, 5.0, 8.0)
        );
    }

    #[test]
    fn test_interpolate_track_hold() {
        let mut track = EntityTrack::bootstrap(EntityId(1), Position::ORIGIN);
        track.target = Position::new(1.0, 1.0, 1.0);
        assert_eq!(interpolate_track(&track, None, AxisMask::ALL), track.target);
    }
}
