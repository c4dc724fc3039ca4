//! # Snapshot Fragmentation
//!
//! A snapshot must reach the observer whole: applying half of one would
//! prune every entity that happened to land in the other half. Snapshots
//! larger than one datagram are split into fragments tagged with the
//! snapshot sequence, and the receiver only releases a snapshot once every
//! fragment of that sequence has arrived.
//!
//! ```text
//! seq 9: [0/3] [1/3] [2/3]   → complete, released
//! seq 10: [0/2] ....         (seq 11 fragment arrives) → seq 10 dropped
//! ```
//!
//! Lost fragments are never retransmitted; the next period supersedes them.

use std::time::Duration;

use skywatch_core::timing::as_micros_u64;

use super::packets::{FragmentHeader, SnapshotFragment, WireEntry};
use super::serialization::MAX_ENTRIES_PER_FRAGMENT;
use crate::error::{SyncError, SyncResult};
use crate::snapshot::Snapshot;

/// Splits a snapshot into datagram-sized fragments.
///
/// An empty snapshot still yields one (empty) fragment so departures reach
/// the observers.
///
/// # Errors
///
/// Returns [`SyncError::PacketTooLarge`] if the snapshot needs more than
/// `u16::MAX` fragments.
pub fn fragment_snapshot(snapshot: &Snapshot) -> SyncResult<Vec<SnapshotFragment>> {
    let entries: Vec<WireEntry> = snapshot.iter().map(|(id, pos)| WireEntry::new(id, pos)).collect();
    let fragment_count = entries.len().div_ceil(MAX_ENTRIES_PER_FRAGMENT).max(1);
    let fragment_count = u16::try_from(fragment_count).map_err(|_| SyncError::PacketTooLarge {
        size: entries.len() * WireEntry::SIZE,
        limit: usize::from(u16::MAX) * MAX_ENTRIES_PER_FRAGMENT * WireEntry::SIZE,
    })?;
    let sampled_at_us = as_micros_u64(snapshot.sampled_at());

    let mut fragments: Vec<SnapshotFragment> = entries
        .chunks(MAX_ENTRIES_PER_FRAGMENT)
        .enumerate()
        .map(|(index, chunk)| SnapshotFragment {
            header: FragmentHeader {
                sampled_at_us,
                fragment_index: index as u16,
                fragment_count,
                entry_count: chunk.len() as u16,
                _padding: 0,
            },
            entries: chunk.to_vec(),
        })
        .collect();

    if fragments.is_empty() {
        fragments.push(SnapshotFragment {
            header: FragmentHeader {
                sampled_at_us,
                fragment_index: 0,
                fragment_count: 1,
                entry_count: 0,
                _padding: 0,
            },
            entries: Vec::new(),
        });
    }
    Ok(fragments)
}

/// Reassembly statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    /// Snapshots released whole.
    pub completed: u64,
    /// Incomplete snapshots dropped because a newer one started.
    pub abandoned: u64,
    /// Fragments ignored (stale, duplicate or inconsistent).
    pub ignored_fragments: u64,
}

struct PendingSnapshot {
    sequence: u64,
    fragment_count: u16,
    received: Vec<bool>,
    remaining: usize,
    snapshot: Snapshot,
}

/// Rebuilds snapshots from fragments, one sequence in flight at a time.
#[derive(Default)]
pub struct SnapshotAssembler {
    pending: Option<PendingSnapshot>,
    last_completed: Option<u64>,
    stats: AssemblerStats,
}

impl SnapshotAssembler {
    /// Creates an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one fragment of snapshot `sequence`.
    ///
    /// Returns the snapshot once its last missing fragment arrives.
    pub fn push(&mut self, sequence: u64, fragment: &SnapshotFragment) -> Option<Snapshot> {
        if self.last_completed.is_some_and(|last| sequence <= last) {
            self.stats.ignored_fragments += 1;
            return None;
        }

        match &self.pending {
            Some(pending) if pending.sequence > sequence => {
                self.stats.ignored_fragments += 1;
                return None;
            }
            Some(pending) if pending.sequence < sequence => {
                tracing::debug!(
                    abandoned = pending.sequence,
                    missing = pending.remaining,
                    next = sequence,
                    "incomplete snapshot abandoned"
                );
                self.stats.abandoned += 1;
                self.pending = None;
            }
            _ => {}
        }

        let header = fragment.header;
        let pending = self.pending.get_or_insert_with(|| PendingSnapshot {
            sequence,
            fragment_count: header.fragment_count,
            received: vec![false; usize::from(header.fragment_count)],
            remaining: usize::from(header.fragment_count),
            snapshot: Snapshot::empty(sequence, Duration::from_micros(header.sampled_at_us)),
        });

        let index = usize::from(header.fragment_index);
        if header.fragment_count != pending.fragment_count
            || index >= pending.received.len()
            || pending.received[index]
        {
            self.stats.ignored_fragments += 1;
            return None;
        }

        pending.received[index] = true;
        pending.remaining -= 1;
        for entry in &fragment.entries {
            pending.snapshot.insert(entry.entity_id(), entry.position());
        }

        if pending.remaining > 0 {
            return None;
        }
        let done = self.pending.take()?;
        self.last_completed = Some(done.sequence);
        self.stats.completed += 1;
        Some(done.snapshot)
    }

    /// Sequence of the last snapshot released.
    #[must_use]
    pub const fn last_completed(&self) -> Option<u64> {
        self.last_completed
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> &AssemblerStats {
        &self.stats
    }

    /// Forgets everything, including the last completed sequence.
    pub fn reset(&mut self) {
        self.pending = None;
        self.last_completed = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skywatch_core::{EntityId, Position};

    fn snapshot(sequence: u64, n: u32) -> Snapshot {
        Snapshot::from_entries(
            sequence,
            Duration::from_millis(sequence * 3000),
            (0..n).map(|i| (EntityId(i), Position::new(i as f32, 0.0, 0.0))),
        )
    }

    #[test]
    fn test_single_fragment_round_trip() {
        let snap = snapshot(1, 10);
        let fragments = fragment_snapshot(&snap).unwrap();
        assert_eq!(fragments.len(), 1);

        let mut assembler = SnapshotAssembler::new();
        let rebuilt = assembler.push(1, &fragments[0]).unwrap();
        assert_eq!(rebuilt, snap);
    }

    #[test]
    fn test_empty_snapshot_yields_one_fragment() {
        let snap = snapshot(4, 0);
        let fragments = fragment_snapshot(&snap).unwrap();
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].entries.is_empty());

        let mut assembler = SnapshotAssembler::new();
        assert_eq!(assembler.push(4, &fragments[0]), Some(snap));
    }

    #[test]
    fn test_multi_fragment_out_of_order() {
        let snap = snapshot(2, 200);
        let fragments = fragment_snapshot(&snap).unwrap();
        assert_eq!(fragments.len(), 3);

        let mut assembler = SnapshotAssembler::new();
        assert!(assembler.push(2, &fragments[2]).is_none());
        assert!(assembler.push(2, &fragments[0]).is_none());
        // Duplicate fragment is ignored.
        assert!(assembler.push(2, &fragments[0]).is_none());
        let rebuilt = assembler.push(2, &fragments[1]).unwrap();
        assert_eq!(rebuilt.len(), 200);
        assert_eq!(rebuilt, snap);
        assert_eq!(assembler.stats().ignored_fragments, 1);
    }

    #[test]
    fn test_newer_sequence_abandons_incomplete() {
        let old = fragment_snapshot(&snapshot(5, 100)).unwrap();
        let new = fragment_snapshot(&snapshot(6, 3)).unwrap();

        let mut assembler = SnapshotAssembler::new();
        assert!(assembler.push(5, &old[0]).is_none());
        assert!(assembler.push(6, &new[0]).is_some());
        // Late remainder of 5 is stale now.
        assert!(assembler.push(5, &old[1]).is_none());

        assert_eq!(assembler.stats().abandoned, 1);
        assert_eq!(assembler.stats().completed, 1);
        assert_eq!(assembler.last_completed(), Some(6));
    }

    #[test]
    fn test_completed_sequence_not_released_twice() {
        let fragments = fragment_snapshot(&snapshot(3, 1)).unwrap();
        let mut assembler = SnapshotAssembler::new();
        assert!(assembler.push(3, &fragments[0]).is_some());
        assert!(assembler.push(3, &fragments[0]).is_none());
    }
}
