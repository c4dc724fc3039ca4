//! # Sync Server
//!
//! The authoritative side: samples entity positions once per period and
//! hands each snapshot to every subscribed observer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       SYNC SERVER                         │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐    │
//! │  │ Subscriptions│  │ Sampler      │  │ Distributor  │    │
//! │  │ (UDP, drain) │──│ (period P)   │──│ (try-send)   │    │
//! │  └──────────────┘  └──────┬───────┘  └──────────────┘    │
//! │                           │                               │
//! │               ┌───────────▼───────────┐                   │
//! │               │ PositionSource (host) │                   │
//! │               └───────────────────────┘                   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick drains pending subscription changes (expiring remote
//! subscribers that stopped renewing), takes one snapshot and distributes
//! it. Nothing in a tick waits on an observer.

mod distributor;
mod sampler;
mod tick;

pub use distributor::{
    ChannelObserver, DistributionReport, Distributor, DistributorStats, Observer, ObserverId,
    ObserverRegistry, SnapshotFeed,
};
pub use sampler::{PositionSource, PositionTable, Sampler, SamplerStats};
pub use tick::TickStats;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use skywatch_core::{Clock, SystemClock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::ServerConfig;
use crate::error::SyncResult;
use crate::transport::SubscriptionListener;

/// Final counters of a stopped server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerReport {
    /// Sampler counters.
    pub sampler: SamplerStats,
    /// Distributor counters.
    pub distributor: DistributorStats,
}

/// Sampler plus distributor over one position source.
pub struct SyncServer<S> {
    source: S,
    sampler: Sampler,
    distributor: Distributor,
    clock: Arc<dyn Clock>,
    listener: Option<SubscriptionListener>,
    queue_capacity: usize,
    subscription_timeout: Duration,
}

impl<S: PositionSource> SyncServer<S> {
    /// Creates a server over `source` using the system clock.
    #[must_use]
    pub fn new(config: &ServerConfig, source: S) -> Self {
        Self::with_clock(config, source, Arc::new(SystemClock::new()))
    }

    /// Creates a server stamping snapshots with `clock`.
    #[must_use]
    pub fn with_clock(config: &ServerConfig, source: S, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::new(ObserverRegistry::new(config.max_observers));
        Self {
            source,
            sampler: Sampler::new(config.sample_period()),
            distributor: Distributor::new(registry),
            clock,
            listener: None,
            queue_capacity: config.observer_queue_capacity,
            subscription_timeout: config.subscription_timeout(),
        }
    }

    /// Starts accepting UDP subscriptions on `addr`.
    ///
    /// # Errors
    ///
    /// Returns the socket error if binding fails.
    pub fn listen(&mut self, addr: SocketAddr) -> SyncResult<SocketAddr> {
        let listener = SubscriptionListener::bind(addr, self.subscription_timeout)?;
        let local = listener.local_addr();
        tracing::info!(
            %local,
            lease_ms = self.subscription_timeout.as_millis() as u64,
            "accepting subscriptions"
        );
        self.listener = Some(listener);
        Ok(local)
    }

    /// Address of the subscription socket, if listening.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(SubscriptionListener::local_addr)
    }

    /// The observer registry.
    #[must_use]
    pub fn registry(&self) -> Arc<ObserverRegistry> {
        Arc::clone(self.distributor.registry())
    }

    /// Registers an in-process observer and returns its feed.
    ///
    /// # Errors
    ///
    /// [`SyncError::RegistryFull`](crate::SyncError::RegistryFull) when at capacity.
    pub fn subscribe_local(&self) -> SyncResult<(ObserverId, SnapshotFeed)> {
        subscribe_channel(self.distributor.registry(), self.queue_capacity)
    }

    /// Runs one sampling period: subscriptions, sample, distribute.
    pub fn tick(&mut self) -> DistributionReport {
        let now = self.clock.now();
        if let Some(listener) = self.listener.as_mut() {
            listener.drain(self.distributor.registry(), now);
        }

        let snapshot = Arc::new(self.sampler.sample(&self.source, now));
        let report = self.distributor.distribute(&snapshot);

        tracing::debug!(
            sequence = snapshot.sequence(),
            entities = snapshot.len(),
            delivered = report.delivered,
            dropped = report.dropped,
            "sampling tick"
        );
        report
    }

    /// Counters so far.
    #[must_use]
    pub fn report(&self) -> ServerReport {
        ServerReport {
            sampler: *self.sampler.stats(),
            distributor: *self.distributor.stats(),
        }
    }
}

impl<S: PositionSource + 'static> SyncServer<S> {
    /// Runs the sampling loop on the current tokio runtime.
    ///
    /// The first snapshot is taken immediately, then once per period. A
    /// tick that overruns pushes the schedule back instead of bursting.
    #[must_use]
    pub fn spawn(mut self) -> ServerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let registry = self.registry();
        let local_addr = self.local_addr();
        let period = self.sampler.period();
        let queue_capacity = self.queue_capacity;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(period_ms = period.as_millis() as u64, "sampling started");

            loop {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        self.tick();
                    }
                }
            }

            let report = self.report();
            tracing::info!(
                snapshots = report.sampler.snapshots,
                late_ticks = report.sampler.timing.late_ticks,
                "sampling stopped"
            );
            report
        });

        ServerHandle {
            shutdown,
            task: Some(task),
            registry,
            local_addr,
            queue_capacity,
        }
    }
}

fn subscribe_channel(
    registry: &ObserverRegistry,
    capacity: usize,
) -> SyncResult<(ObserverId, SnapshotFeed)> {
    let (observer, feed) = ChannelObserver::new(registry.allocate_id(), capacity);
    let id = observer.id();
    registry.register(Arc::new(observer))?;
    Ok((id, feed))
}

/// Handle to a running [`SyncServer`].
///
/// Dropping the handle stops the server.
#[derive(Debug)]
pub struct ServerHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<ServerReport>>,
    registry: Arc<ObserverRegistry>,
    local_addr: Option<SocketAddr>,
    queue_capacity: usize,
}

impl ServerHandle {
    /// Asks the sampling loop to stop. Safe to call any number of times.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }

    /// True while the sampling loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// The observer registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ObserverRegistry> {
        &self.registry
    }

    /// Address of the subscription socket, if listening.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Registers an in-process observer and returns its feed.
    ///
    /// # Errors
    ///
    /// [`SyncError::RegistryFull`](crate::SyncError::RegistryFull) when at capacity.
    pub fn subscribe_local(&self) -> SyncResult<(ObserverId, SnapshotFeed)> {
        subscribe_channel(&self.registry, self.queue_capacity)
    }

    /// Stops the loop and waits for it, returning its final counters.
    ///
    /// Returns `None` if the loop panicked or was already awaited.
    pub async fn shutdown(mut self) -> Option<ServerReport> {
        self.stop();
        let task = self.task.take()?;
        match task.await {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::error!(error = %err, "sampling task failed");
                None
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
