//! In-process spectator fed straight from a [`SnapshotFeed`].

use std::sync::Arc;

use skywatch_core::Clock;

use super::presentation::PresentationSink;
use super::session::{SharedSession, SyncSession};
use crate::server::SnapshotFeed;

/// Spectator living in the same process as the server.
///
/// Same receive/interpolate split as the UDP client, minus the socket.
pub struct LocalSpectator {
    feed: SnapshotFeed,
    session: SharedSession,
    clock: Arc<dyn Clock>,
}

impl LocalSpectator {
    /// Creates a spectator reading `feed` into `session`.
    #[must_use]
    pub fn new(feed: SnapshotFeed, session: SyncSession, clock: Arc<dyn Clock>) -> Self {
        Self {
            feed,
            session: SharedSession::new(session),
            clock,
        }
    }

    /// The session, for handing to a render thread.
    #[must_use]
    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }

    /// Applies the newest queued snapshot and discards the older ones.
    ///
    /// Applying a backlog one by one would stamp every arrival with the same
    /// instant and collapse the interpolation window, so only the latest
    /// sample counts. Returns the number applied (0 or 1).
    pub fn poll(&mut self, sink: &mut dyn PresentationSink) -> usize {
        let queued = self.feed.drain();
        let backlog = queued.len();
        let Some(newest) = queued.into_iter().max_by_key(|s| s.sequence()) else {
            return 0;
        };
        if backlog > 1 {
            tracing::debug!(
                sequence = newest.sequence(),
                superseded = backlog - 1,
                "skipping queued snapshots behind the newest"
            );
        }
        usize::from(
            self.session
                .apply_snapshot(&newest, self.clock.now(), sink)
                .is_applied(),
        )
    }

    /// One interpolation tick at the clock's current time.
    pub fn render_tick(&self, sink: &mut dyn PresentationSink) -> Option<f32> {
        self.session.interpolate(self.clock.now(), sink)
    }
}
