//! # Spectator Client
//!
//! The observer side: receives snapshots, keeps a [`SyncSession`] and
//! drives a [`PresentationSink`] from it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     SPECTATOR CLIENT                      │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐    │
//! │  │ Network I/O  │  │ Receiver     │  │ Interpolator │    │
//! │  │ (fragments)  │──│ (on arrival) │  │ (render tick)│    │
//! │  └──────────────┘  └──────┬───────┘  └──────┬───────┘    │
//! │                           │                 │             │
//! │               ┌───────────▼─────────────────▼──┐          │
//! │               │ SharedSession (tracks, window) │          │
//! │               └───────────────┬────────────────┘          │
//! │                               ▼                           │
//! │                       PresentationSink                    │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod local;
mod presentation;
mod receiver;
mod session;

pub use local::LocalSpectator;
pub use presentation::{NullSink, PresentationEvent, PresentationSink, RecordingSink};
pub use receiver::ApplyOutcome;
pub use session::{EntityTrack, SessionStats, SharedSession, SyncSession};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use skywatch_core::{Clock, SystemClock};

use crate::config::SpectatorConfig;
use crate::error::SyncResult;
use crate::snapshot::Snapshot;
use crate::protocol::{decode_packet, AssemblerStats, Packet, PacketHeader, PacketSerializer, SnapshotAssembler};
use crate::transport::{TransportStats, UdpTransport};

/// How long to wait for a first snapshot before re-sending a subscription.
pub const SUBSCRIBE_RETRY: Duration = Duration::from_secs(1);

/// Client state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClientState {
    /// Not subscribed.
    #[default]
    Disconnected,
    /// Subscription sent, no snapshot yet.
    Subscribing,
    /// Receiving snapshots.
    Receiving,
}

/// Spectator over UDP.
///
/// Call [`poll`](Self::poll) whenever convenient (it never blocks) and
/// [`render_tick`](Self::render_tick) once per frame. Polling also keeps the
/// subscription alive: the server forgets spectators that stop renewing.
pub struct SpectatorClient {
    transport: UdpTransport,
    server: SocketAddr,
    state: ClientState,
    assembler: SnapshotAssembler,
    session: SharedSession,
    clock: Arc<dyn Clock>,
    serializer: PacketSerializer,
    control_sequence: u64,
    last_subscribe: Option<Duration>,
    renew_interval: Duration,
}

impl SpectatorClient {
    /// Binds the local socket; does not subscribe yet.
    ///
    /// # Errors
    ///
    /// Returns the socket error if binding fails.
    pub fn bind(config: &SpectatorConfig) -> SyncResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Like [`bind`](Self::bind), timing arrivals with `clock`.
    ///
    /// # Errors
    ///
    /// Returns the socket error if binding fails.
    pub fn with_clock(config: &SpectatorConfig, clock: Arc<dyn Clock>) -> SyncResult<Self> {
        let transport = UdpTransport::bind(config.bind_address)?;
        Ok(Self {
            transport,
            server: config.server_address,
            state: ClientState::Disconnected,
            assembler: SnapshotAssembler::new(),
            session: SharedSession::new(SyncSession::with_axes(config.interpolated_axes)),
            clock,
            serializer: PacketSerializer::new(),
            control_sequence: 0,
            last_subscribe: None,
            renew_interval: config.resubscribe_interval(),
        })
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> ClientState {
        self.state
    }

    /// Local socket address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// The session, for handing to a render thread.
    #[must_use]
    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }

    /// Transport statistics.
    #[must_use]
    pub const fn transport_stats(&self) -> &TransportStats {
        self.transport.stats()
    }

    /// Fragment reassembly statistics.
    #[must_use]
    pub const fn assembler_stats(&self) -> &AssemblerStats {
        self.assembler.stats()
    }

    /// Asks the server for snapshots.
    ///
    /// # Errors
    ///
    /// Returns the socket error if the request cannot be sent.
    pub fn subscribe(&mut self) -> SyncResult<()> {
        self.send_control(true)?;
        self.last_subscribe = Some(self.clock.now());
        if self.state == ClientState::Disconnected {
            self.state = ClientState::Subscribing;
            tracing::info!(server = %self.server, "subscribing");
        }
        Ok(())
    }

    /// Stops the subscription and removes every displayed entity.
    ///
    /// # Errors
    ///
    /// Returns the socket error if the request cannot be sent. The local
    /// session is cleared either way.
    pub fn unsubscribe(&mut self, sink: &mut dyn PresentationSink) -> SyncResult<()> {
        self.state = ClientState::Disconnected;
        self.last_subscribe = None;
        self.assembler.reset();
        self.session.clear(sink);
        tracing::info!(server = %self.server, "unsubscribed");
        self.send_control(false)
    }

    /// Reads every pending datagram and applies the newest completed snapshot.
    ///
    /// Older snapshots completed in the same call are skipped so a burst of
    /// late datagrams does not collapse the interpolation window. Returns the
    /// number of snapshots applied (0 or 1).
    pub fn poll(&mut self, sink: &mut dyn PresentationSink) -> usize {
        if self.state == ClientState::Disconnected {
            return 0;
        }
        self.renew_subscription();

        let mut newest: Option<Snapshot> = None;
        let mut superseded = 0usize;
        while let Some((data, from)) = self.transport.recv() {
            if from != self.server {
                tracing::debug!(%from, "ignoring datagram from unknown peer");
                continue;
            }
            let (header, fragment) = match decode_packet(data) {
                Ok(Packet::SnapshotFragment(header, fragment)) => (header, fragment),
                Ok(other) => {
                    tracing::debug!(packet = ?other.header(), "ignoring control packet from server");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(%from, error = %err, "dropping malformed datagram");
                    continue;
                }
            };

            let Some(snapshot) = self.assembler.push(header.sequence, &fragment) else {
                continue;
            };
            let is_newer = newest
                .as_ref()
                .map_or(true, |kept| snapshot.sequence() > kept.sequence());
            if !is_newer || newest.replace(snapshot).is_some() {
                superseded += 1;
            }
        }

        let Some(snapshot) = newest else {
            return 0;
        };
        if superseded > 0 {
            tracing::debug!(
                sequence = snapshot.sequence(),
                superseded,
                "skipping completed snapshots behind the newest"
            );
        }
        if !self
            .session
            .apply_snapshot(&snapshot, self.clock.now(), sink)
            .is_applied()
        {
            return 0;
        }
        if self.state == ClientState::Subscribing {
            self.state = ClientState::Receiving;
            tracing::info!(sequence = snapshot.sequence(), "first snapshot received");
        }
        1
    }

    /// One interpolation tick at the clock's current time.
    pub fn render_tick(&self, sink: &mut dyn PresentationSink) -> Option<f32> {
        self.session.interpolate(self.clock.now(), sink)
    }

    fn renew_subscription(&mut self) {
        let every = match self.state {
            ClientState::Disconnected => return,
            ClientState::Subscribing => SUBSCRIBE_RETRY,
            ClientState::Receiving => self.renew_interval,
        };
        let now = self.clock.now();
        let due = self
            .last_subscribe
            .map_or(true, |at| now.saturating_sub(at) >= every);
        if due {
            if let Err(err) = self.subscribe() {
                tracing::warn!(error = %err, state = ?self.state, "subscription renewal failed");
            }
        }
    }

    fn send_control(&mut self, subscribe: bool) -> SyncResult<()> {
        self.control_sequence += 1;
        let header = PacketHeader::new(self.control_sequence);
        let packet = if subscribe {
            Packet::Subscribe(header)
        } else {
            Packet::Unsubscribe(header)
        };
        let bytes = self.serializer.serialize(&packet)?;
        self.transport.send_to(bytes, self.server)?;
        Ok(())
    }
}
