//! # Sync Session
//!
//! Observer-side state for one observation: the entity tracks plus the
//! snapshot timing that drives the interpolation denominator.
//!
//! Two cadences touch a session:
//!
//! - the snapshot receiver ([`SyncSession::apply_snapshot`]), on network arrival
//! - the interpolator ([`SyncSession::interpolate`]), on every render tick
//!
//! When they run on different threads, wrap the session in a
//! [`SharedSession`]; every call then holds the session lock for its full
//! duration, so a tick never sees a half-applied snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use skywatch_core::{AxisMask, EntityId, Position};

use super::presentation::PresentationSink;
use super::receiver::ApplyOutcome;
use crate::snapshot::Snapshot;

/// Interpolation state of one tracked entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntityTrack {
    pub(crate) id: EntityId,
    pub(crate) start: Position,
    pub(crate) target: Position,
    pub(crate) displayed: Position,
}

impl EntityTrack {
    /// A track for a brand-new entity: no motion until a second sample.
    #[must_use]
    pub const fn bootstrap(id: EntityId, position: Position) -> Self {
        Self {
            id,
            start: position,
            target: position,
            displayed: position,
        }
    }

    /// Opens a new window from what is currently displayed towards `target`.
    pub(crate) fn retarget(&mut self, target: Position) {
        self.start = self.displayed;
        self.target = target;
    }

    /// Entity id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Position at the start of the current window.
    #[inline]
    #[must_use]
    pub const fn start(&self) -> Position {
        self.start
    }

    /// Most recent sample for this entity.
    #[inline]
    #[must_use]
    pub const fn target(&self) -> Position {
        self.target
    }

    /// Last computed display position.
    #[inline]
    #[must_use]
    pub const fn displayed(&self) -> Position {
        self.displayed
    }

    /// True while the current window has somewhere to go.
    #[inline]
    #[must_use]
    pub fn is_moving(&self) -> bool {
        self.start != self.target
    }
}

/// Counters kept by a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Snapshots applied.
    pub snapshots_applied: u64,
    /// Snapshots ignored because their sequence was already applied.
    pub duplicates_ignored: u64,
    /// Snapshots ignored because a newer one was already applied.
    pub stale_ignored: u64,
    /// Tracks created.
    pub entities_created: u64,
    /// Tracks removed.
    pub entities_removed: u64,
}

/// Observer-side sync state for one observation.
#[derive(Clone, Debug, Default)]
pub struct SyncSession {
    pub(crate) tracks: BTreeMap<EntityId, EntityTrack>,
    pub(crate) last_snapshot_at: Option<Duration>,
    pub(crate) interval: Option<Duration>,
    pub(crate) last_sequence: Option<u64>,
    pub(crate) axes: AxisMask,
    pub(crate) stats: SessionStats,
}

impl SyncSession {
    /// Creates an empty session blending every axis.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty session blending only the given axes.
    #[must_use]
    pub fn with_axes(axes: AxisMask) -> Self {
        Self {
            axes,
            ..Self::default()
        }
    }

    /// Axes the interpolator blends.
    #[inline]
    #[must_use]
    pub const fn axes(&self) -> AxisMask {
        self.axes
    }

    /// Arrival time of the most recent snapshot.
    #[inline]
    #[must_use]
    pub const fn last_snapshot_at(&self) -> Option<Duration> {
        self.last_snapshot_at
    }

    /// Gap between the two most recent snapshot arrivals.
    ///
    /// `None` until two snapshots have arrived.
    #[inline]
    #[must_use]
    pub const fn inter_snapshot_interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Sequence of the most recently applied snapshot.
    #[inline]
    #[must_use]
    pub const fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Track for one entity.
    #[must_use]
    pub fn track(&self, id: EntityId) -> Option<&EntityTrack> {
        self.tracks.get(&id)
    }

    /// All tracks in ascending id order.
    pub fn tracks(&self) -> impl Iterator<Item = &EntityTrack> {
        self.tracks.values()
    }

    /// Number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// True if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Drops every track and forgets all timing.
    ///
    /// Emits one `remove` per dropped track.
    pub fn clear(&mut self, sink: &mut dyn PresentationSink) {
        for id in std::mem::take(&mut self.tracks).into_keys() {
            self.stats.entities_removed += 1;
            sink.remove(id);
        }
        self.last_snapshot_at = None;
        self.interval = None;
        self.last_sequence = None;
    }
}

/// A [`SyncSession`] shared between the receive and render cadences.
///
/// Cloning shares the same session.
#[derive(Clone, Debug, Default)]
pub struct SharedSession {
    inner: Arc<Mutex<SyncSession>>,
}

impl SharedSession {
    /// Wraps a session.
    #[must_use]
    pub fn new(session: SyncSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Applies a snapshot under the session lock.
    pub fn apply_snapshot(
        &self,
        snapshot: &Snapshot,
        now: Duration,
        sink: &mut dyn PresentationSink,
    ) -> ApplyOutcome {
        self.inner.lock().apply_snapshot(snapshot, now, sink)
    }

    /// Runs one interpolation tick under the session lock.
    pub fn interpolate(&self, now: Duration, sink: &mut dyn PresentationSink) -> Option<f32> {
        self.inner.lock().interpolate(now, sink)
    }

    /// Clears the session under the lock.
    pub fn clear(&self, sink: &mut dyn PresentationSink) {
        self.inner.lock().clear(sink);
    }

    /// Runs `f` with shared access to the session.
    pub fn read<R>(&self, f: impl FnOnce(&SyncSession) -> R) -> R {
        let guard = self.inner.lock();
        f(&*guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::presentation::RecordingSink;

    #[test]
    fn test_bootstrap_track() {
        let track = EntityTrack::bootstrap(EntityId(1), Position::new(4.0, 5.0, 6.0));
        assert_eq!(track.start(), track.target());
        assert_eq!(track.target(), track.displayed());
        assert!(!track.is_moving());
    }

    #[test]
    fn test_retarget_carries_displayed() {
        let mut track = EntityTrack::bootstrap(EntityId(1), Position::ORIGIN);
        track.target = Position::new(10.0, 0.0, 0.0);
        track.displayed = Position::new(4.0, 0.0, 0.0);
        track.retarget(Position::new(20.0, 0.0, 0.0));
        assert_eq!(track.start(), Position::new(4.0, 0.0, 0.0));
        assert_eq!(track.target(), Position::new(20.0, 0.0, 0.0));
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut session = SyncSession::new();
        let mut sink = RecordingSink::new();
        let snap = Snapshot::from_entries(
            1,
            Duration::ZERO,
            [(EntityId(1), Position::ORIGIN), (EntityId(2), Position::ORIGIN)],
        );
        session.apply_snapshot(&snap, Duration::ZERO, &mut sink);
        session.clear(&mut sink);

        assert!(session.is_empty());
        assert_eq!(session.last_snapshot_at(), None);
        assert_eq!(session.last_sequence(), None);
        assert_eq!(sink.removals_of(EntityId(1)), 1);
        assert_eq!(sink.removals_of(EntityId(2)), 1);
    }

    #[test]
    fn test_shared_session_is_shared() {
        let shared = SharedSession::new(SyncSession::new());
        let other = shared.clone();
        let snap = Snapshot::from_entries(1, Duration::ZERO, [(EntityId(7), Position::ORIGIN)]);
        shared.apply_snapshot(&snap, Duration::ZERO, &mut RecordingSink::new());
        assert_eq!(other.read(SyncSession::len), 1);
    }
}
