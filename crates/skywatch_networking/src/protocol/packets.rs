//! # Packet Definitions
//!
//! All packet types used between a sync server and its spectators.
//!
//! All fixed-size parts are `Pod` so they are copied straight in and out of
//! datagram buffers.

use bytemuck::{Pod, Zeroable};
use skywatch_core::{EntityId, Position};

/// Packet header - present in every packet.
///
/// Total size: 8 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PacketHeader {
    /// Snapshot sequence for fragments; sender-chosen counter otherwise.
    pub sequence: u64,
}

impl PacketHeader {
    /// Creates a new packet header.
    #[inline]
    #[must_use]
    pub const fn new(sequence: u64) -> Self {
        Self { sequence }
    }

    /// Size of the header in bytes.
    pub const SIZE: usize = 8;
}

/// Types of packets in the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    /// Spectator -> Server: start sending me snapshots.
    Subscribe = 1,
    /// Spectator -> Server: stop sending me snapshots.
    Unsubscribe = 2,
    /// Server -> Spectator: one fragment of a snapshot.
    SnapshotFragment = 3,
}

impl PacketType {
    /// Decodes the leading type byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Subscribe),
            2 => Some(Self::Unsubscribe),
            3 => Some(Self::SnapshotFragment),
            _ => None,
        }
    }
}

/// Fixed part of a snapshot fragment.
///
/// Size: 16 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct FragmentHeader {
    /// Server sampling time in microseconds.
    pub sampled_at_us: u64,
    /// Index of this fragment, `0..fragment_count`.
    pub fragment_index: u16,
    /// Number of fragments making up the snapshot.
    pub fragment_count: u16,
    /// Entries carried by this fragment.
    pub entry_count: u16,
    /// Padding for alignment.
    pub _padding: u16,
}

impl FragmentHeader {
    /// Size of the fragment header in bytes.
    pub const SIZE: usize = 16;
}

/// One entity on the wire.
///
/// Size: 16 bytes
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct WireEntry {
    /// Entity id.
    pub id: u32,
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Z coordinate.
    pub z: f32,
}

impl WireEntry {
    /// Size in bytes.
    pub const SIZE: usize = 16;

    /// Packs an entity.
    #[inline]
    #[must_use]
    pub const fn new(id: EntityId, position: Position) -> Self {
        Self {
            id: id.0,
            x: position.x,
            y: position.y,
            z: position.z,
        }
    }

    /// Entity id.
    #[inline]
    #[must_use]
    pub const fn entity_id(&self) -> EntityId {
        EntityId(self.id)
    }

    /// Entity position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> Position {
        Position::new(self.x, self.y, self.z)
    }
}

/// A snapshot fragment: header plus its slice of entries.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotFragment {
    /// Fixed part.
    pub header: FragmentHeader,
    /// Entries in ascending id order.
    pub entries: Vec<WireEntry>,
}

/// A decoded packet.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    /// Subscription request.
    Subscribe(PacketHeader),
    /// Subscription cancel.
    Unsubscribe(PacketHeader),
    /// Snapshot fragment; the header carries the snapshot sequence.
    SnapshotFragment(PacketHeader, SnapshotFragment),
}

impl Packet {
    /// Header of any packet.
    #[must_use]
    pub const fn header(&self) -> &PacketHeader {
        match self {
            Self::Subscribe(h) | Self::Unsubscribe(h) | Self::SnapshotFragment(h, _) => h,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_sizes() {
        assert_eq!(std::mem::size_of::<PacketHeader>(), PacketHeader::SIZE);
        assert_eq!(std::mem::size_of::<FragmentHeader>(), FragmentHeader::SIZE);
        assert_eq!(std::mem::size_of::<WireEntry>(), WireEntry::SIZE);
    }

    #[test]
    fn test_packet_type_byte() {
        assert_eq!(PacketType::from_u8(3), Some(PacketType::SnapshotFragment));
        assert_eq!(PacketType::from_u8(0), None);
        assert_eq!(PacketType::from_u8(PacketType::Subscribe as u8), Some(PacketType::Subscribe));
    }

    #[test]
    fn test_wire_entry_packing() {
        let entry = WireEntry::new(EntityId(12), Position::new(1.5, -2.0, 3.25));
        assert_eq!(entry.entity_id(), EntityId(12));
        assert_eq!(entry.position(), Position::new(1.5, -2.0, 3.25));
    }
}
