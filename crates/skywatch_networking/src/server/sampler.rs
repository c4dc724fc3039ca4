//! # Sampler
//!
//! Captures every active entity's position into one [`Snapshot`] per period.
//!
//! ## Failure policy
//!
//! A position that cannot be read (or is not finite) leaves that entity out
//! of this snapshot only. The tick itself always completes; observers see
//! the entity again on the next period it reads cleanly.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use skywatch_core::{EntityId, Position};

use super::tick::TickStats;
use crate::error::SourceError;
use crate::snapshot::Snapshot;

/// Authoritative entity positions, as seen by the sampler.
pub trait PositionSource: Send {
    /// Ids of all currently active entities.
    fn active_entities(&self) -> Vec<EntityId>;

    /// Current position of one entity.
    fn position(&self, id: EntityId) -> Result<Position, SourceError>;
}

/// Sampler statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Snapshots produced.
    pub snapshots: u64,
    /// Entity positions captured across all snapshots.
    pub entities_sampled: u64,
    /// Positions that could not be read and were left out.
    pub read_failures: u64,
    /// Tick timing against the sampling period.
    pub timing: TickStats,
}

/// Turns a [`PositionSource`] into numbered snapshots.
pub struct Sampler {
    period: Duration,
    next_sequence: u64,
    stats: SamplerStats,
}

impl Sampler {
    /// Creates a sampler for the given period.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_sequence: 1,
            stats: SamplerStats::default(),
        }
    }

    /// Sampling period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Sequence the next snapshot will carry.
    #[must_use]
    pub const fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Statistics so far.
    #[must_use]
    pub const fn stats(&self) -> &SamplerStats {
        &self.stats
    }

    /// Takes one snapshot of `source`, stamped `now`.
    pub fn sample<S: PositionSource + ?Sized>(&mut self, source: &S, now: Duration) -> Snapshot {
        let started = Instant::now();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let mut failures = 0u64;
        let entries: Vec<(EntityId, Position)> = source
            .active_entities()
            .into_iter()
            .filter_map(|id| match source.position(id) {
                Ok(pos) if pos.is_finite() => Some((id, pos)),
                Ok(_) => {
                    failures += 1;
                    tracing::debug!(%id, "non-finite position left out of snapshot");
                    None
                }
                Err(err) => {
                    failures += 1;
                    tracing::debug!(%id, error = %err, "position read failed, left out of snapshot");
                    None
                }
            })
            .collect();

        let snapshot = Snapshot::from_entries(sequence, now, entries);

        self.stats.snapshots += 1;
        self.stats.entities_sampled += snapshot.len() as u64;
        self.stats.read_failures += failures;
        self.stats.timing.record(started.elapsed(), self.period);

        snapshot
    }
}

/// Shared, thread-safe table of entity positions.
///
/// The host writes positions as the simulation moves; the sampler reads
/// them. Cloning shares the table.
#[derive(Clone, Debug, Default)]
pub struct PositionTable {
    inner: Arc<RwLock<BTreeMap<EntityId, Position>>>,
}

impl PositionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or moves an entity.
    pub fn set(&self, id: EntityId, position: Position) {
        self.inner.write().insert(id, position);
    }

    /// Removes an entity. Returns true if it was present.
    pub fn remove(&self, id: EntityId) -> bool {
        self.inner.write().remove(&id).is_some()
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// True if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl PositionSource for PositionTable {
    fn active_entities(&self) -> Vec<EntityId> {
        self.inner.read().keys().copied().collect()
    }

    fn position(&self, id: EntityId) -> Result<Position, SourceError> {
        self.inner.read().get(&id).copied().ok_or(SourceError::Gone(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakySource {
        broken: EntityId,
    }

    impl PositionSource for FlakySource {
        fn active_entities(&self) -> Vec<EntityId> {
            vec![EntityId(1), EntityId(2), EntityId(3), EntityId(4)]
        }

        fn position(&self, id: EntityId) -> Result<Position, SourceError> {
            if id == self.broken {
                Err(SourceError::Unavailable(id, "streaming out".into()))
            } else if id == EntityId(4) {
                Ok(Position::new(f32::NAN, 0.0, 0.0))
            } else {
                Ok(Position::new(id.0 as f32, 0.0, 0.0))
            }
        }
    }

    #[test]
    fn test_failed_reads_are_omitted() {
        let mut sampler = Sampler::new(Duration::from_millis(3000));
        let source = FlakySource { broken: EntityId(2) };

        let snap = sampler.sample(&source, Duration::from_secs(3));

        assert_eq!(snap.len(), 2);
        assert!(snap.contains(EntityId(1)));
        assert!(!snap.contains(EntityId(2)));
        assert!(snap.contains(EntityId(3)));
        assert!(!snap.contains(EntityId(4)));
        assert_eq!(sampler.stats().read_failures, 2);
        assert_eq!(sampler.stats().entities_sampled, 2);
    }

    #[test]
    fn test_sequences_increase() {
        let mut sampler = Sampler::new(Duration::from_millis(3000));
        let table = PositionTable::new();
        let a = sampler.sample(&table, Duration::ZERO);
        let b = sampler.sample(&table, Duration::from_secs(3));
        assert_eq!(a.sequence(), 1);
        assert_eq!(b.sequence(), 2);
        assert_eq!(b.sampled_at(), Duration::from_secs(3));
        assert_eq!(sampler.next_sequence(), 3);
        assert_eq!(sampler.stats().timing.total_ticks, 2);
    }

    #[test]
    fn test_position_table_churn() {
        let mut sampler = Sampler::new(Duration::from_millis(3000));
        let table = PositionTable::new();
        table.set(EntityId(1), Position::new(1.0, 2.0, 3.0));
        table.set(EntityId(2), Position::ORIGIN);
        assert_eq!(sampler.sample(&table, Duration::ZERO).len(), 2);

        assert!(table.remove(EntityId(2)));
        assert!(!table.remove(EntityId(2)));
        let snap = sampler.sample(&table, Duration::ZERO);
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get(EntityId(1)), Some(Position::new(1.0, 2.0, 3.0)));
    }
}
