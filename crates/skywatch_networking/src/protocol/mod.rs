//! # Network Protocol
//!
//! Binary packets between a sync server and its spectators.
//!
//! ## Packet Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Type (1) │ Header: Sequence (8)                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │ SnapshotFragment only:                                       │
//! │   SampledAt µs (8) │ Index (2) │ Count (2) │ Entries (2) │ - │
//! │   Entry × n: Id (4) │ X (4) │ Y (4) │ Z (4)                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every datagram stays under [`MAX_PACKET_SIZE`](crate::MAX_PACKET_SIZE).

mod fragment;
mod packets;
mod serialization;

pub use fragment::{fragment_snapshot, AssemblerStats, SnapshotAssembler};
pub use packets::{
    FragmentHeader, Packet, PacketHeader, PacketType, SnapshotFragment, WireEntry,
};
pub use serialization::{
    decode_packet, encoded_len, PacketDeserializer, PacketSerializer, MAX_ENTRIES_PER_FRAGMENT,
};
