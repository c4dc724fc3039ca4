//! # Distributor
//!
//! Fans each snapshot out to every registered observer.
//!
//! ```text
//!                      ┌─► ChannelObserver ─► in-process spectator
//! Sampler ─► Arc<Snapshot> ─► UdpObserver ─► remote spectator
//!                      └─► ...
//! ```
//!
//! Delivery is best-effort and never blocks: an observer whose queue is
//! full simply misses this snapshot (the next one supersedes it), and an
//! observer that went away is deregistered.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::RwLock;

use crate::error::{DeliveryError, SyncError, SyncResult};
use crate::snapshot::Snapshot;

/// Identifies one registered observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(pub u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Anything that can receive snapshots.
pub trait Observer: Send + Sync {
    /// Registry id of this observer.
    fn id(&self) -> ObserverId;

    /// Hands one snapshot over. Must not block.
    fn deliver(&self, snapshot: &Arc<Snapshot>) -> Result<(), DeliveryError>;
}

/// The set of observers currently subscribed.
///
/// Shared between the sampling task and whatever accepts subscriptions.
pub struct ObserverRegistry {
    observers: RwLock<BTreeMap<ObserverId, Arc<dyn Observer>>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl ObserverRegistry {
    /// Creates a registry holding at most `capacity` observers.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            observers: RwLock::new(BTreeMap::new()),
            capacity,
            next_id: AtomicU64::new(1),
        }
    }

    /// Hands out a fresh observer id.
    pub fn allocate_id(&self) -> ObserverId {
        ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers an observer.
    ///
    /// Returns `Ok(false)` if an observer with the same id is already
    /// registered; the registry is unchanged in that case.
    ///
    /// # Errors
    ///
    /// [`SyncError::RegistryFull`] when at capacity.
    pub fn register(&self, observer: Arc<dyn Observer>) -> SyncResult<bool> {
        let mut observers = self.observers.write();
        let id = observer.id();
        if observers.contains_key(&id) {
            return Ok(false);
        }
        if observers.len() >= self.capacity {
            return Err(SyncError::RegistryFull {
                capacity: self.capacity,
            });
        }
        observers.insert(id, observer);
        tracing::info!(%id, total = observers.len(), "observer registered");
        Ok(true)
    }

    /// Deregisters an observer. Returns true if it was registered.
    pub fn deregister(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let removed = observers.remove(&id).is_some();
        if removed {
            tracing::info!(%id, total = observers.len(), "observer deregistered");
        }
        removed
    }

    /// True if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: ObserverId) -> bool {
        self.observers.read().contains_key(&id)
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    /// True if nobody is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Maximum number of observers.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current membership, cloned out so delivery runs without the lock.
    #[must_use]
    pub fn members(&self) -> Vec<Arc<dyn Observer>> {
        self.observers.read().values().cloned().collect()
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.read().keys().collect::<Vec<_>>())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Outcome of one distribution round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistributionReport {
    /// Sequence that was distributed.
    pub sequence: u64,
    /// Observers that accepted the snapshot.
    pub delivered: usize,
    /// Observers that missed it (queue full or send error).
    pub dropped: usize,
    /// Observers found gone and deregistered.
    pub disconnected: Vec<ObserverId>,
}

/// Distributor totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DistributorStats {
    /// Snapshots distributed.
    pub rounds: u64,
    /// Successful deliveries.
    pub delivered: u64,
    /// Dropped deliveries.
    pub dropped: u64,
    /// Observers deregistered after disconnecting.
    pub disconnected: u64,
}

/// Delivers snapshots to the registry's members.
#[derive(Debug)]
pub struct Distributor {
    registry: Arc<ObserverRegistry>,
    stats: DistributorStats,
}

impl Distributor {
    /// Creates a distributor over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ObserverRegistry>) -> Self {
        Self {
            registry,
            stats: DistributorStats::default(),
        }
    }

    /// The registry this distributor reads.
    #[must_use]
    pub fn registry(&self) -> &Arc<ObserverRegistry> {
        &self.registry
    }

    /// Totals so far.
    #[must_use]
    pub const fn stats(&self) -> &DistributorStats {
        &self.stats
    }

    /// Delivers `snapshot` to every current observer.
    pub fn distribute(&mut self, snapshot: &Arc<Snapshot>) -> DistributionReport {
        let mut report = DistributionReport {
            sequence: snapshot.sequence(),
            ..DistributionReport::default()
        };

        for observer in self.registry.members() {
            match observer.deliver(snapshot) {
                Ok(()) => report.delivered += 1,
                Err(DeliveryError::Disconnected) => {
                    self.registry.deregister(observer.id());
                    report.disconnected.push(observer.id());
                }
                Err(err) => {
                    tracing::debug!(id = %observer.id(), error = %err, "snapshot dropped for observer");
                    report.dropped += 1;
                }
            }
        }

        self.stats.rounds += 1;
        self.stats.delivered += report.delivered as u64;
        self.stats.dropped += report.dropped as u64;
        self.stats.disconnected += report.disconnected.len() as u64;

        tracing::trace!(
            sequence = report.sequence,
            delivered = report.delivered,
            dropped = report.dropped,
            "snapshot distributed"
        );
        report
    }
}

/// In-process observer backed by a bounded crossbeam channel.
#[derive(Debug)]
pub struct ChannelObserver {
    id: ObserverId,
    sender: Sender<Arc<Snapshot>>,
}

impl ChannelObserver {
    /// Creates an observer and the feed its snapshots arrive on.
    #[must_use]
    pub fn new(id: ObserverId, capacity: usize) -> (Self, SnapshotFeed) {
        let (sender, receiver) = bounded(capacity.max(1));
        (Self { id, sender }, SnapshotFeed { receiver })
    }
}

impl Observer for ChannelObserver {
    fn id(&self) -> ObserverId {
        self.id
    }

    fn deliver(&self, snapshot: &Arc<Snapshot>) -> Result<(), DeliveryError> {
        self.sender.try_send(Arc::clone(snapshot)).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Disconnected(_) => DeliveryError::Disconnected,
        })
    }
}

/// Receiving end of a [`ChannelObserver`].
///
/// Dropping the feed disconnects the observer; the distributor then
/// deregisters it on its next round.
#[derive(Debug)]
pub struct SnapshotFeed {
    receiver: Receiver<Arc<Snapshot>>,
}

impl SnapshotFeed {
    /// Next queued snapshot, if any.
    #[must_use]
    pub fn try_recv(&self) -> Option<Arc<Snapshot>> {
        self.receiver.try_recv().ok()
    }

    /// Waits up to `timeout` for a snapshot.
    ///
    /// Returns `None` on timeout or once the distributor side is gone.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Arc<Snapshot>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(snapshot) => Some(snapshot),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Takes everything queued, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<Arc<Snapshot>> {
        self.receiver.try_iter().collect()
    }

    /// Number of snapshots waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// True if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
