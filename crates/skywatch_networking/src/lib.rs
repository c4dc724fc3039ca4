//! # Skywatch Networking
//!
//! Real-time entity-position sync: one authoritative process samples where
//! every entity is, and any number of spectators show those entities moving
//! smoothly between samples.
//!
//! ## Architecture
//!
//! - **Server**: periodic [`Sampler`] plus a non-blocking [`Distributor`]
//! - **Protocol**: fixed-layout binary packets, snapshots fragmented to fit
//!   one datagram each (< 1200 bytes)
//! - **Transport**: non-blocking UDP, no retransmission
//! - **Client**: [`SyncSession`] fed by the snapshot receiver and drained by
//!   the interpolator into a [`PresentationSink`]
//!
//! ## Timing Model
//!
//! ```text
//! server   S1 ─────────── P ─────────── S2 ─────────── P ─────────── S3
//!           │                            │                            │
//! observer  ▼ arrive(a1)                 ▼ arrive(a2)                 ▼
//!           create ── hold ──────────────┼── lerp over (a2 - a1) ─────┼─ ...
//! ```
//!
//! The observer blends from what it currently shows towards the newest
//! sample over the gap between the last two arrivals, so it always lags the
//! truth by about one period and never extrapolates.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use skywatch_core::{EntityId, ManualClock, Position};
//! use skywatch_networking::{
//!     LocalSpectator, PositionTable, RecordingSink, ServerConfig, SyncServer, SyncSession,
//! };
//!
//! let clock = ManualClock::new();
//! let table = PositionTable::new();
//! let mut server = SyncServer::with_clock(&ServerConfig::default(), table.clone(), Arc::new(clock.clone()));
//! let (_, feed) = server.subscribe_local().unwrap();
//! let mut spectator = LocalSpectator::new(feed, SyncSession::new(), Arc::new(clock.clone()));
//! let mut sink = RecordingSink::new();
//!
//! table.set(EntityId(1), Position::new(0.0, 0.0, 0.0));
//! server.tick();
//! spectator.poll(&mut sink);
//!
//! clock.advance(Duration::from_millis(3000));
//! table.set(EntityId(1), Position::new(30.0, 0.0, 0.0));
//! server.tick();
//! spectator.poll(&mut sink);
//!
//! clock.advance(Duration::from_millis(1500));
//! spectator.render_tick(&mut sink);
//! assert_eq!(sink.last_position(EntityId(1)), Some(Position::new(15.0, 0.0, 0.0)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod client;
pub mod config;
pub mod error;
pub mod interpolation;
pub mod protocol;
pub mod server;
pub mod snapshot;
pub mod transport;

// Re-exports for convenience
pub use client::{
    ApplyOutcome, ClientState, EntityTrack, LocalSpectator, NullSink, PresentationEvent,
    PresentationSink, RecordingSink, SessionStats, SharedSession, SpectatorClient, SyncSession,
};
pub use config::{ServerConfig, SpectatorConfig, SyncConfig};
pub use error::{DeliveryError, SourceError, SyncError, SyncResult};
pub use interpolation::interpolate_track;
pub use protocol::{Packet, PacketHeader, PacketType, SnapshotAssembler};
pub use server::{
    ChannelObserver, DistributionReport, Distributor, Observer, ObserverId, ObserverRegistry,
    PositionSource, PositionTable, Sampler, SamplerStats, ServerHandle, ServerReport,
    SnapshotFeed, SyncServer,
};
pub use snapshot::Snapshot;
pub use transport::{SubscriptionListener, UdpObserver, UdpTransport};

/// Default sampling period `P` in milliseconds.
pub const DEFAULT_SAMPLE_PERIOD_MS: u64 = 3000;

/// Default UDP port of the sync server.
pub const DEFAULT_PORT: u16 = 7788;

/// Default lease of a remote subscription in milliseconds (five periods).
pub const DEFAULT_SUBSCRIPTION_TIMEOUT_MS: u64 = 15_000;

/// Default interval between subscription renewals in milliseconds.
pub const DEFAULT_RESUBSCRIBE_INTERVAL_MS: u64 = 5_000;

/// Maximum Transmission Unit - packets must be smaller than this.
///
/// We use 1200 bytes to be safe across all networks (< 1500 MTU).
pub const MAX_PACKET_SIZE: usize = 1200;
