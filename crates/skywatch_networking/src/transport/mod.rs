//! # Transport Layer
//!
//! Non-blocking UDP for snapshot delivery and subscription control.
//!
//! ## Design
//!
//! - Raw UDP, one datagram per packet, no retransmission
//! - Non-blocking sockets so neither side ever waits on the other
//! - One server socket carries both subscriptions in and snapshots out

mod observer;

pub use observer::{SubscriptionListener, UdpFanout, UdpObserver};

use std::io;
use std::net::SocketAddr;

use crate::MAX_PACKET_SIZE;

/// UDP socket wrapper for snapshot traffic.
///
/// This is a thin wrapper around std UDP with:
/// - Non-blocking mode
/// - A fixed receive buffer sized to the datagram limit
/// - Packet statistics
#[derive(Debug)]
pub struct UdpTransport {
    /// The underlying socket.
    socket: std::net::UdpSocket,
    /// Local address.
    local_addr: SocketAddr,
    /// Receive buffer.
    recv_buffer: [u8; MAX_PACKET_SIZE],
    /// Statistics.
    stats: TransportStats,
}

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Packets sent.
    pub packets_sent: u64,
    /// Packets received.
    pub packets_received: u64,
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Send errors.
    pub send_errors: u64,
    /// Receive errors.
    pub recv_errors: u64,
}

impl UdpTransport {
    /// Creates a new transport bound to the specified address.
    ///
    /// # Errors
    ///
    /// Returns the socket error if binding fails.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = std::net::UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            recv_buffer: [0u8; MAX_PACKET_SIZE],
            stats: TransportStats::default(),
        })
    }

    /// Returns the local address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sends a packet to the specified address.
    ///
    /// # Errors
    ///
    /// Returns the socket error, including `WouldBlock` when the send
    /// buffer is full.
    pub fn send_to(&mut self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        match self.socket.send_to(data, addr) {
            Ok(n) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += n as u64;
                Ok(n)
            }
            Err(e) => {
                self.stats.send_errors += 1;
                Err(e)
            }
        }
    }

    /// Receives a packet.
    ///
    /// Returns the packet data and source address, or None if no packet available.
    pub fn recv(&mut self) -> Option<(&[u8], SocketAddr)> {
        loop {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((len, addr)) => {
                    self.stats.packets_received += 1;
                    self.stats.bytes_received += len as u64;
                    return Some((&self.recv_buffer[..len], addr));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                // ICMP noise from a peer that went away; keep reading
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                    self.stats.recv_errors += 1;
                }
                Err(e) => {
                    self.stats.recv_errors += 1;
                    tracing::debug!(error = %e, "udp receive failed");
                    return None;
                }
            }
        }
    }

    /// Returns statistics.
    #[must_use]
    pub const fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Resets statistics.
    pub fn reset_stats(&mut self) {
        self.stats = TransportStats::default();
    }
}
