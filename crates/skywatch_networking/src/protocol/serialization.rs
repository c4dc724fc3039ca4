//! # Packet Serialization
//!
//! Writes packets into a reusable fixed-size buffer and reads them back.
//!
//! ## Design
//!
//! - One pre-allocated buffer per serializer, reused for every datagram
//! - Little-endian scalars, `Pod` structs copied directly
//! - Writers return `false` instead of overflowing the buffer

use bytemuck::{bytes_of, Pod};

use super::packets::{
    FragmentHeader, Packet, PacketHeader, PacketType, SnapshotFragment, WireEntry,
};
use crate::error::{SyncError, SyncResult};
use crate::MAX_PACKET_SIZE;

/// Largest number of entries that fit in one fragment datagram.
pub const MAX_ENTRIES_PER_FRAGMENT: usize =
    (MAX_PACKET_SIZE - 1 - PacketHeader::SIZE - FragmentHeader::SIZE) / WireEntry::SIZE;

/// Packet serializer - writes packets to a pre-allocated buffer.
///
/// Reuse one serializer across datagrams to avoid allocations.
pub struct PacketSerializer {
    buffer: [u8; MAX_PACKET_SIZE],
    position: usize,
}

impl PacketSerializer {
    /// Creates a new serializer with a fresh buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: [0u8; MAX_PACKET_SIZE],
            position: 0,
        }
    }

    /// Resets the serializer for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.position
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.position == 0
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.position]
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> bool {
        if self.position >= MAX_PACKET_SIZE {
            return false;
        }
        self.buffer[self.position] = value;
        self.position += 1;
        true
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> bool {
        let bytes = bytes_of(value);
        if self.position + bytes.len() > MAX_PACKET_SIZE {
            return false;
        }
        self.buffer[self.position..self.position + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        true
    }

    /// Writes a packet header.
    #[inline]
    pub fn write_header(&mut self, header: &PacketHeader) -> bool {
        self.write_pod(header)
    }

    /// Serializes a subscribe packet.
    pub fn serialize_subscribe(&mut self, header: &PacketHeader) -> bool {
        self.reset();
        self.write_u8(PacketType::Subscribe as u8) && self.write_header(header)
    }

    /// Serializes an unsubscribe packet.
    pub fn serialize_unsubscribe(&mut self, header: &PacketHeader) -> bool {
        self.reset();
        self.write_u8(PacketType::Unsubscribe as u8) && self.write_header(header)
    }

    /// Serializes one snapshot fragment.
    ///
    /// The header's `entry_count` is taken from `fragment.entries`.
    pub fn serialize_fragment(&mut self, header: &PacketHeader, fragment: &SnapshotFragment) -> bool {
        self.reset();
        let Ok(entry_count) = u16::try_from(fragment.entries.len()) else {
            return false;
        };
        let fixed = FragmentHeader {
            entry_count,
            ..fragment.header
        };

        if !(self.write_u8(PacketType::SnapshotFragment as u8)
            && self.write_header(header)
            && self.write_pod(&fixed))
        {
            return false;
        }
        fragment.entries.iter().all(|entry| self.write_pod(entry))
    }

    /// Serializes any packet.
    pub fn serialize(&mut self, packet: &Packet) -> SyncResult<&[u8]> {
        let ok = match packet {
            Packet::Subscribe(h) => self.serialize_subscribe(h),
            Packet::Unsubscribe(h) => self.serialize_unsubscribe(h),
            Packet::SnapshotFragment(h, f) => self.serialize_fragment(h, f),
        };
        if ok {
            Ok(self.as_slice())
        } else {
            Err(SyncError::PacketTooLarge {
                size: encoded_len(packet),
                limit: MAX_PACKET_SIZE,
            })
        }
    }
}

impl Default for PacketSerializer {
    fn default() -> Self {
        Self::new()
    }
}

/// Encoded size of a packet in bytes.
#[must_use]
pub fn encoded_len(packet: &Packet) -> usize {
    let body = match packet {
        Packet::Subscribe(_) | Packet::Unsubscribe(_) => 0,
        Packet::SnapshotFragment(_, f) => FragmentHeader::SIZE + f.entries.len() * WireEntry::SIZE,
    };
    1 + PacketHeader::SIZE + body
}

/// Packet deserializer - reads packets from a buffer.
pub struct PacketDeserializer<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PacketDeserializer<'a> {
    /// Creates a new deserializer from a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Option<u8> {
        let value = *self.buffer.get(self.position)?;
        self.position += 1;
        Some(value)
    }

    /// Reads a Pod type directly.
    #[inline]
    pub fn read_pod<T: Pod>(&mut self) -> Option<T> {
        let size = std::mem::size_of::<T>();
        let slice = self.buffer.get(self.position..self.position + size)?;
        self.position += size;
        bytemuck::try_pod_read_unaligned(slice).ok()
    }

    /// Reads a packet header.
    #[inline]
    pub fn read_header(&mut self) -> Option<PacketHeader> {
        self.read_pod()
    }

    /// Deserializes a packet, or `None` if the bytes are not a valid packet.
    pub fn deserialize(&mut self) -> Option<Packet> {
        let packet_type = PacketType::from_u8(self.read_u8()?)?;
        let header = self.read_header()?;

        let packet = match packet_type {
            PacketType::Subscribe => Packet::Subscribe(header),
            PacketType::Unsubscribe => Packet::Unsubscribe(header),
            PacketType::SnapshotFragment => {
                let fixed = self.read_pod::<FragmentHeader>()?;
                if fixed.fragment_count == 0 || fixed.fragment_index >= fixed.fragment_count {
                    return None;
                }
                let count = usize::from(fixed.entry_count);
                if count > MAX_ENTRIES_PER_FRAGMENT || self.remaining() != count * WireEntry::SIZE {
                    return None;
                }
                let mut entries = Vec::with_capacity(count);
                for _ in 0..count {
                    let entry = self.read_pod::<WireEntry>()?;
                    if !entry.position().is_finite() {
                        return None;
                    }
                    entries.push(entry);
                }
                Packet::SnapshotFragment(header, SnapshotFragment { header: fixed, entries })
            }
        };

        if self.remaining() != 0 {
            return None;
        }
        Some(packet)
    }
}

/// Decodes one datagram.
///
/// # Errors
///
/// Returns [`SyncError::MalformedPacket`] for an unknown type byte,
/// inconsistent fragment counts, a body whose length does not match its
/// entry count, or a non-finite position.
pub fn decode_packet(bytes: &[u8]) -> SyncResult<Packet> {
    PacketDeserializer::new(bytes)
        .deserialize()
        .ok_or(SyncError::MalformedPacket("datagram does not decode"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skywatch_core::{EntityId, Position};

    fn fragment(n: usize) -> SnapshotFragment {
        SnapshotFragment {
            header: FragmentHeader {
                sampled_at_us: 3_000_000,
                fragment_index: 0,
                fragment_count: 1,
                entry_count: 0,
                _padding: 0,
            },
            entries: (0..n)
                .map(|i| WireEntry::new(EntityId(i as u32), Position::new(i as f32, 1.0, 2.0)))
                .collect(),
        }
    }

    #[test]
    fn test_serialize_deserialize_fragment() {
        let mut serializer = PacketSerializer::new();
        let header = PacketHeader::new(42);
        assert!(serializer.serialize_fragment(&header, &fragment(5)));
        assert_eq!(serializer.len(), 1 + 8 + 16 + 5 * 16);

        let packet = decode_packet(serializer.as_slice()).unwrap();
        let Packet::SnapshotFragment(h, f) = packet else {
            panic!("Expected SnapshotFragment packet");
        };
        assert_eq!(h.sequence, 42);
        assert_eq!(f.header.entry_count, 5);
        assert_eq!(f.header.sampled_at_us, 3_000_000);
        assert_eq!(f.entries[4].position(), Position::new(4.0, 1.0, 2.0));
    }

    #[test]
    fn test_subscribe_packets() {
        let mut serializer = PacketSerializer::new();
        let bytes = serializer.serialize(&Packet::Subscribe(PacketHeader::new(7))).unwrap();
        assert_eq!(decode_packet(bytes).unwrap(), Packet::Subscribe(PacketHeader::new(7)));

        let bytes = serializer.serialize(&Packet::Unsubscribe(PacketHeader::new(8))).unwrap();
        assert_eq!(decode_packet(bytes).unwrap(), Packet::Unsubscribe(PacketHeader::new(8)));
    }

    #[test]
    fn test_full_fragment_under_mtu() {
        let mut serializer = PacketSerializer::new();
        assert!(serializer.serialize_fragment(&PacketHeader::new(1), &fragment(MAX_ENTRIES_PER_FRAGMENT)));
        assert!(serializer.len() <= MAX_PACKET_SIZE, "Packet too large: {} bytes", serializer.len());
    }

    #[test]
    fn test_oversize_fragment_rejected() {
        let mut serializer = PacketSerializer::new();
        let packet = Packet::SnapshotFragment(PacketHeader::new(1), fragment(MAX_ENTRIES_PER_FRAGMENT + 1));
        let err = serializer.serialize(&packet).unwrap_err();
        assert!(matches!(err, SyncError::PacketTooLarge { limit: MAX_PACKET_SIZE, .. }));
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(decode_packet(&[]).is_err());
        assert!(decode_packet(&[99, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
        // Truncated header.
        assert!(decode_packet(&[PacketType::Subscribe as u8, 1, 2]).is_err());

        let mut serializer = PacketSerializer::new();
        assert!(serializer.serialize_fragment(&PacketHeader::new(1), &fragment(2)));
        let bytes = serializer.as_slice();
        // Truncated entries.
        assert!(decode_packet(&bytes[..bytes.len() - 1]).is_err());
        // Trailing garbage.
        let mut longer = bytes.to_vec();
        longer.push(0);
        assert!(decode_packet(&longer).is_err());
    }

    #[test]
    fn test_non_finite_entry_rejected() {
        let mut bad = fragment(1);
        bad.entries[0].x = f32::NAN;
        let mut serializer = PacketSerializer::new();
        assert!(serializer.serialize_fragment(&PacketHeader::new(1), &bad));
        assert!(decode_packet(serializer.as_slice()).is_err());
    }
}
