//! # Entity Identity
//!
//! Entities are identified by the id the authoritative source hands out.
//! Identity is stable for as long as the entity stays in consecutive
//! snapshots; a gap means the entity left.

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Identifier of a tracked entity.
///
/// Unique among the entities currently present in a snapshot. Ids may be
/// reused after an entity leaves; observers treat the reappearance as a new
/// entity.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl EntityId {
    /// Creates an entity id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for EntityId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_ordering() {
        let mut ids = vec![EntityId(7), EntityId(2), EntityId(5)];
        ids.sort();
        assert_eq!(ids, vec![EntityId(2), EntityId(5), EntityId(7)]);
    }

    #[test]
    fn test_entity_id_display() {
        assert_eq!(EntityId::new(42).to_string(), "#42");
        assert_eq!(EntityId::from(42).raw(), 42);
    }
}
