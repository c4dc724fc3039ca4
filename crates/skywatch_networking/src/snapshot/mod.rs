//! # Snapshots
//!
//! One atomic capture of every tracked entity's position.
//!
//! ```text
//! Sampler tick k:   { #1 → (0,0,0), #2 → (5,5,0) }          seq k
//! Sampler tick k+1: { #1 → (3,0,0), #3 → (9,1,0) }          seq k+1
//!                        │              │
//!                        │              └─ first appearance: #3 joined
//!                        └─ #2 absent: left, observers prune it
//! ```
//!
//! A snapshot is immutable once built and shared as `Arc<Snapshot>` so the
//! distributor can fan it out without copying.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::time::Duration;

use skywatch_core::{EntityId, Position};

/// Immutable capture of all entity positions at one sampling instant.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    sequence: u64,
    sampled_at: Duration,
    entries: BTreeMap<EntityId, Position>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn empty(sequence: u64, sampled_at: Duration) -> Self {
        Self {
            sequence,
            sampled_at,
            entries: BTreeMap::new(),
        }
    }

    /// Creates a snapshot from `(id, position)` pairs.
    ///
    /// A repeated id keeps the last position given for it.
    #[must_use]
    pub fn from_entries<I>(sequence: u64, sampled_at: Duration, entries: I) -> Self
    where
        I: IntoIterator<Item = (EntityId, Position)>,
    {
        Self {
            sequence,
            sampled_at,
            entries: entries.into_iter().collect(),
        }
    }

    /// Sampling tick number. Strictly increasing on one server.
    #[inline]
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Server-side time the snapshot was taken.
    #[inline]
    #[must_use]
    pub const fn sampled_at(&self) -> Duration {
        self.sampled_at
    }

    /// Position of one entity, if present.
    #[inline]
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<Position> {
        self.entries.get(&id).copied()
    }

    /// Whether the entity is present.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no entity is present.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entities in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, Position)> + '_ {
        self.entries.iter().map(|(id, pos)| (*id, *pos))
    }

    /// Entity ids in ascending order.
    pub fn ids(&self) -> btree_map::Keys<'_, EntityId, Position> {
        self.entries.keys()
    }

    pub(crate) fn insert(&mut self, id: EntityId, position: Position) {
        self.entries.insert(id, position);
    }
}
