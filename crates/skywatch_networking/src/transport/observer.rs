//! Remote observers over UDP.
//!
//! A [`SubscriptionListener`] owns the server socket (through a shared
//! [`UdpFanout`]) and turns subscribe/unsubscribe datagrams into registry
//! changes. Each subscriber becomes a [`UdpObserver`] that sends the
//! fragments of every snapshot to its address.
//!
//! A subscription is a lease: spectators repeat `Subscribe` while they
//! listen, and an address that stays quiet for longer than the lease is
//! deregistered.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{TransportStats, UdpTransport};
use crate::error::{DeliveryError, SyncError, SyncResult};
use crate::protocol::{decode_packet, fragment_snapshot, Packet, PacketHeader, PacketSerializer};
use crate::server::{Observer, ObserverId, ObserverRegistry};
use crate::snapshot::Snapshot;

/// Encoded datagrams of the most recent snapshot.
#[derive(Debug, Default)]
struct EncodedSnapshot {
    sequence: Option<u64>,
    datagrams: Arc<Vec<Vec<u8>>>,
}

/// The server socket plus a one-snapshot encode cache.
///
/// Every [`UdpObserver`] shares one fanout, so a snapshot is fragmented and
/// encoded once per period no matter how many observers there are.
#[derive(Debug)]
pub struct UdpFanout {
    transport: Mutex<UdpTransport>,
    encoded: Mutex<EncodedSnapshot>,
}

impl UdpFanout {
    /// Binds the server socket.
    ///
    /// # Errors
    ///
    /// Returns the socket error if binding fails.
    pub fn bind(addr: SocketAddr) -> SyncResult<Self> {
        Ok(Self {
            transport: Mutex::new(UdpTransport::bind(addr)?),
            encoded: Mutex::new(EncodedSnapshot::default()),
        })
    }

    /// Local address of the server socket.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.lock().local_addr()
    }

    /// Transport statistics.
    #[must_use]
    pub fn stats(&self) -> TransportStats {
        *self.transport.lock().stats()
    }

    /// Datagrams for `snapshot`, encoding them on first use.
    fn datagrams(&self, snapshot: &Snapshot) -> SyncResult<Arc<Vec<Vec<u8>>>> {
        let mut cache = self.encoded.lock();
        if cache.sequence == Some(snapshot.sequence()) {
            return Ok(Arc::clone(&cache.datagrams));
        }

        let header = PacketHeader::new(snapshot.sequence());
        let mut serializer = PacketSerializer::new();
        let datagrams = fragment_snapshot(snapshot)?
            .into_iter()
            .map(|fragment| {
                serializer
                    .serialize(&Packet::SnapshotFragment(header, fragment))
                    .map(<[u8]>::to_vec)
            })
            .collect::<SyncResult<Vec<_>>>()?;

        cache.sequence = Some(snapshot.sequence());
        cache.datagrams = Arc::new(datagrams);
        Ok(Arc::clone(&cache.datagrams))
    }

    fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.transport.lock().send_to(data, addr)
    }
}

/// One remote subscriber.
#[derive(Debug)]
pub struct UdpObserver {
    id: ObserverId,
    addr: SocketAddr,
    fanout: Arc<UdpFanout>,
}

impl UdpObserver {
    /// Creates an observer sending to `addr` through `fanout`.
    #[must_use]
    pub fn new(id: ObserverId, addr: SocketAddr, fanout: Arc<UdpFanout>) -> Self {
        Self { id, addr, fanout }
    }

    /// Subscriber address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Observer for UdpObserver {
    fn id(&self) -> ObserverId {
        self.id
    }

    fn deliver(&self, snapshot: &Arc<Snapshot>) -> Result<(), DeliveryError> {
        let datagrams = self.fanout.datagrams(snapshot).map_err(DeliveryError::Encode)?;
        for datagram in datagrams.iter() {
            match self.fanout.send_to(datagram, self.addr) {
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    return Err(DeliveryError::Disconnected);
                }
                Err(e) => return Err(DeliveryError::Io(e)),
            }
        }
        Ok(())
    }
}

/// One subscribed address.
#[derive(Clone, Copy, Debug)]
struct Subscriber {
    id: ObserverId,
    last_seen: Duration,
}

/// Accepts subscriptions on the server socket.
#[derive(Debug)]
pub struct SubscriptionListener {
    fanout: Arc<UdpFanout>,
    subscribers: HashMap<SocketAddr, Subscriber>,
    lease: Duration,
}

impl SubscriptionListener {
    /// Binds the server socket at `addr`. Subscribers that send nothing for
    /// `lease` are dropped.
    ///
    /// # Errors
    ///
    /// Returns the socket error if binding fails.
    pub fn bind(addr: SocketAddr, lease: Duration) -> SyncResult<Self> {
        Ok(Self {
            fanout: Arc::new(UdpFanout::bind(addr)?),
            subscribers: HashMap::new(),
            lease,
        })
    }

    /// Local address subscribers should send to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.fanout.local_addr()
    }

    /// The shared socket and encode cache.
    #[must_use]
    pub fn fanout(&self) -> &Arc<UdpFanout> {
        &self.fanout
    }

    /// Number of addresses this listener has subscribed.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// How long a subscription lasts without renewal.
    #[must_use]
    pub const fn lease(&self) -> Duration {
        self.lease
    }

    /// Processes every pending control datagram, then expires lapsed
    /// subscriptions as of `now`.
    ///
    /// Returns the number of registry changes made.
    pub fn drain(&mut self, registry: &ObserverRegistry, now: Duration) -> usize {
        let mut changes = 0;
        for (packet, from) in self.pending() {
            match packet {
                Packet::Subscribe(_) => {
                    if self.subscribe(from, registry, now) {
                        changes += 1;
                    }
                }
                Packet::Unsubscribe(_) => {
                    if let Some(subscriber) = self.subscribers.remove(&from) {
                        if registry.deregister(subscriber.id) {
                            changes += 1;
                        }
                    }
                }
                Packet::SnapshotFragment(..) => {
                    tracing::warn!(%from, "unexpected snapshot fragment on server socket");
                }
            }
        }
        changes + self.expire(registry, now)
    }

    fn expire(&mut self, registry: &ObserverRegistry, now: Duration) -> usize {
        let lease = self.lease;
        let mut expired = 0;
        self.subscribers.retain(|addr, subscriber| {
            // Already gone, e.g. after a refused delivery.
            if !registry.contains(subscriber.id) {
                return false;
            }
            if now.saturating_sub(subscriber.last_seen) < lease {
                return true;
            }
            if registry.deregister(subscriber.id) {
                expired += 1;
            }
            tracing::info!(
                from = %addr,
                id = %subscriber.id,
                lease_ms = lease.as_millis() as u64,
                "subscription lapsed"
            );
            false
        });
        expired
    }

    fn pending(&self) -> Vec<(Packet, SocketAddr)> {
        let mut transport = self.fanout.transport.lock();
        let mut packets = Vec::new();
        while let Some((data, from)) = transport.recv() {
            match decode_packet(data) {
                Ok(packet) => packets.push((packet, from)),
                Err(err) => tracing::warn!(%from, error = %err, "dropping malformed control packet"),
            }
        }
        packets
    }

    fn subscribe(&mut self, from: SocketAddr, registry: &ObserverRegistry, now: Duration) -> bool {
        if let Some(subscriber) = self.subscribers.get_mut(&from) {
            if registry.contains(subscriber.id) {
                subscriber.last_seen = now;
                return false;
            }
        }

        let id = registry.allocate_id();
        let observer = UdpObserver::new(id, from, Arc::clone(&self.fanout));
        match registry.register(Arc::new(observer)) {
            Ok(added) => {
                self.subscribers.insert(from, Subscriber { id, last_seen: now });
                if added {
                    tracing::info!(%from, %id, "remote observer subscribed");
                }
                added
            }
            Err(SyncError::RegistryFull { capacity }) => {
                tracing::warn!(%from, capacity, "subscription refused, registry full");
                false
            }
            Err(err) => {
                tracing::warn!(%from, error = %err, "subscription failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skywatch_core::{EntityId, Position};

    const LEASE: Duration = Duration::from_secs(15);

    fn listener() -> SubscriptionListener {
        SubscriptionListener::bind("127.0.0.1:0".parse().unwrap(), LEASE).unwrap()
    }

    fn wait_for<T>(mut poll: impl FnMut() -> Option<T>) -> Option<T> {
        for _ in 0..200 {
            if let Some(value) = poll() {
                return Some(value);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        None
    }

    fn control(packet: &Packet, client: &mut UdpTransport, server: SocketAddr) {
        let mut serializer = PacketSerializer::new();
        let bytes = serializer.serialize(packet).unwrap();
        client.send_to(bytes, server).unwrap();
    }

    #[test]
    fn test_subscribe_then_unsubscribe() {
        let registry = ObserverRegistry::new(8);
        let mut listener = listener();
        let mut client = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let server = listener.local_addr();

        control(&Packet::Subscribe(PacketHeader::new(1)), &mut client, server);
        control(&Packet::Subscribe(PacketHeader::new(2)), &mut client, server);
        wait_for(|| {
            listener.drain(&registry, Duration::ZERO);
            (registry.len() == 1).then_some(())
        })
        .expect("subscription never processed");
        std::thread::sleep(Duration::from_millis(20));
        listener.drain(&registry, Duration::ZERO);
        assert_eq!(registry.len(), 1);
        assert_eq!(listener.subscriber_count(), 1);

        control(&Packet::Unsubscribe(PacketHeader::new(3)), &mut client, server);
        wait_for(|| {
            listener.drain(&registry, Duration::ZERO);
            registry.is_empty().then_some(())
        })
        .expect("unsubscribe never processed");
    }

    #[test]
    fn test_observer_sends_every_fragment() {
        let listener = listener();
        let mut client = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let observer = UdpObserver::new(ObserverId(1), client.local_addr(), Arc::clone(listener.fanout()));

        let snapshot = Arc::new(Snapshot::from_entries(
            7,
            Duration::from_secs(21),
            (0..200u32).map(|i| (EntityId(i), Position::new(i as f32, 0.0, 0.0))),
        ));
        observer.deliver(&snapshot).unwrap();

        let expected = fragment_snapshot(&snapshot).unwrap().len();
        assert!(expected > 1);

        let mut received = 0;
        wait_for(|| {
            while let Some((data, _)) = client.recv() {
                assert!(matches!(decode_packet(data), Ok(Packet::SnapshotFragment(h, _)) if h.sequence == 7));
                received += 1;
            }
            (received == expected).then_some(())
        })
        .expect("fragments never arrived");
        assert_eq!(listener.fanout().stats().packets_sent, expected as u64);
    }

    #[test]
    fn test_silent_subscriber_lapses() {
        let registry = ObserverRegistry::new(8);
        let mut listener = listener();
        let mut quiet = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut chatty = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let server = listener.local_addr();

        control(&Packet::Subscribe(PacketHeader::new(1)), &mut quiet, server);
        control(&Packet::Subscribe(PacketHeader::new(1)), &mut chatty, server);
        wait_for(|| {
            listener.drain(&registry, Duration::ZERO);
            (registry.len() == 2).then_some(())
        })
        .expect("subscriptions never processed");

        // Only one of them renews before the lease runs out.
        let renewed_at = Duration::from_secs(10);
        control(&Packet::Subscribe(PacketHeader::new(2)), &mut chatty, server);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(listener.drain(&registry, renewed_at), 0);
        assert_eq!(registry.len(), 2);

        assert_eq!(listener.drain(&registry, LEASE), 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(listener.subscriber_count(), 1);

        // The renewal keeps the other one until its own lease ends.
        assert_eq!(listener.drain(&registry, renewed_at + LEASE - Duration::from_millis(1)), 0);
        assert_eq!(listener.drain(&registry, renewed_at + LEASE), 1);
        assert!(registry.is_empty());
        assert_eq!(listener.subscriber_count(), 0);
    }

    #[test]
    fn test_lapsed_subscriber_can_return() {
        let registry = ObserverRegistry::new(8);
        let mut listener = listener();
        let mut client = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let server = listener.local_addr();

        control(&Packet::Subscribe(PacketHeader::new(1)), &mut client, server);
        wait_for(|| {
            listener.drain(&registry, Duration::ZERO);
            (registry.len() == 1).then_some(())
        })
        .expect("subscription never processed");
        assert_eq!(listener.drain(&registry, LEASE * 2), 1);
        assert!(registry.is_empty());

        let later = LEASE * 3;
        control(&Packet::Subscribe(PacketHeader::new(2)), &mut client, server);
        wait_for(|| {
            listener.drain(&registry, later);
            (registry.len() == 1).then_some(())
        })
        .expect("resubscription never processed");
        assert_eq!(listener.subscriber_count(), 1);
    }

    #[test]
    fn test_deregistered_subscriber_is_pruned() {
        let registry = ObserverRegistry::new(8);
        let mut listener = listener();
        let mut client = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let server = listener.local_addr();

        control(&Packet::Subscribe(PacketHeader::new(1)), &mut client, server);
        wait_for(|| {
            listener.drain(&registry, Duration::ZERO);
            (registry.len() == 1).then_some(())
        })
        .expect("subscription never processed");

        let id = registry.members()[0].id();
        assert!(registry.deregister(id));
        assert_eq!(listener.drain(&registry, Duration::from_secs(1)), 0);
        assert_eq!(listener.subscriber_count(), 0);
    }
}
