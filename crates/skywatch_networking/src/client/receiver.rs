//! # Snapshot Receiver
//!
//! Folds an arriving snapshot into a [`SyncSession`].
//!
//! Per snapshot:
//!
//! 1. Record arrival time; the gap to the previous arrival becomes the new
//!    interpolation window length.
//! 2. Prune tracks whose entity is absent (`remove` to the sink).
//! 3. Bootstrap new entities at their reported position (`create`), and
//!    retarget existing ones from what is currently displayed.
//!
//! Snapshots are self-contained, so anything not newer than the last applied
//! sequence (a duplicate delivery or a late straggler) is ignored outright.

use std::collections::btree_map::Entry;
use std::time::Duration;

use skywatch_core::EntityId;

use super::presentation::PresentationSink;
use super::session::{EntityTrack, SyncSession};
use crate::snapshot::Snapshot;

/// What applying a snapshot did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The snapshot was folded in.
    Applied {
        /// Entities seen for the first time.
        created: usize,
        /// Entities retargeted.
        updated: usize,
        /// Entities pruned.
        removed: usize,
    },
    /// Same sequence as the last applied snapshot.
    Duplicate,
    /// Older than the last applied snapshot.
    Stale,
}

impl ApplyOutcome {
    /// True if the snapshot changed the session.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

impl SyncSession {
    /// Applies one snapshot that arrived at `now`.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &Snapshot,
        now: Duration,
        sink: &mut dyn PresentationSink,
    ) -> ApplyOutcome {
        let sequence = snapshot.sequence();
        if let Some(last) = self.last_sequence {
            if sequence == last {
                self.stats.duplicates_ignored += 1;
                tracing::trace!(sequence, "duplicate snapshot ignored");
                return ApplyOutcome::Duplicate;
            }
            if sequence < last {
                self.stats.stale_ignored += 1;
                tracing::debug!(sequence, last, "stale snapshot ignored");
                return ApplyOutcome::Stale;
            }
        }

        // A clock that steps backwards yields a zero window, which holds at target.
        self.interval = self.last_snapshot_at.map(|prev| now.saturating_sub(prev));
        self.last_snapshot_at = Some(now);
        self.last_sequence = Some(sequence);

        let departed: Vec<EntityId> = self
            .tracks
            .keys()
            .filter(|id| !snapshot.contains(**id))
            .copied()
            .collect();
        for id in &departed {
            self.tracks.remove(id);
            sink.remove(*id);
        }

        let mut created = 0;
        let mut updated = 0;
        for (id, position) in snapshot.iter() {
            match self.tracks.entry(id) {
                Entry::Occupied(mut slot) => {
                    slot.get_mut().retarget(position);
                    updated += 1;
                }
                Entry::Vacant(slot) => {
                    slot.insert(EntityTrack::bootstrap(id, position));
                    sink.create(id, position);
                    created += 1;
                }
            }
        }

        self.stats.snapshots_applied += 1;
        self.stats.entities_created += created as u64;
        self.stats.entities_removed += departed.len() as u64;

        tracing::debug!(
            sequence,
            created,
            updated,
            removed = departed.len(),
            interval_ms = self.interval.map(|d| d.as_millis() as u64),
            "snapshot applied"
        );

        ApplyOutcome::Applied {
            created,
            updated,
            removed: departed.len(),
        }
    }
}
