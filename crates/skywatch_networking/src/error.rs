//! # Sync Error Types
//!
//! Errors surfaced by the sync layer. Per-entity read failures and
//! degenerate interpolation windows are handled in place and never show up
//! here.

use std::io;

use skywatch_core::EntityId;
use thiserror::Error;

/// Errors that can occur in the sync layer.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Socket or file I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A config file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A config value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A datagram did not decode into a packet.
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    /// An encoded packet would not fit in one datagram.
    #[error("packet too large: {size} bytes, limit {limit}")]
    PacketTooLarge {
        /// Encoded size.
        size: usize,
        /// Datagram limit.
        limit: usize,
    },

    /// The observer registry is at capacity.
    #[error("observer registry full: capacity {capacity}")]
    RegistryFull {
        /// Maximum number of observers.
        capacity: usize,
    },
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Failure to read one entity's position at sampling time.
///
/// Transient by definition: the entity is left out of the current snapshot
/// and read again next period.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The entity vanished between enumeration and read.
    #[error("entity {0} no longer exists")]
    Gone(EntityId),

    /// The entity exists but has no readable position right now.
    #[error("position of entity {0} unavailable: {1}")]
    Unavailable(EntityId, String),
}

/// Failure to hand a snapshot to one observer.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// The observer's queue is full; this snapshot is dropped for it.
    #[error("observer queue full")]
    Full,

    /// The observer went away.
    #[error("observer disconnected")]
    Disconnected,

    /// Sending over the network failed.
    #[error("send failed: {0}")]
    Io(#[from] io::Error),

    /// Encoding the snapshot failed.
    #[error("encode failed: {0}")]
    Encode(#[source] SyncError),
}
