//! # Presentation Sink
//!
//! The only externally visible effect of the observer side. Whatever draws
//! markers (a minimap, a debug overlay, a log) implements
//! [`PresentationSink`] and is driven by track lifecycle transitions:
//!
//! ```text
//! Unseen ──create──► Bootstrapped ──update*──► Interpolating ──remove──► Removed
//! ```

use skywatch_core::{EntityId, Position};

/// Receiver of per-entity display events.
pub trait PresentationSink {
    /// An entity appeared; show it at `position` right away.
    fn create(&mut self, id: EntityId, position: Position);

    /// New displayed position for a live entity.
    fn update(&mut self, id: EntityId, position: Position);

    /// The entity left; tear its marker down.
    fn remove(&mut self, id: EntityId);
}

/// One recorded sink call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PresentationEvent {
    /// See [`PresentationSink::create`].
    Create(EntityId, Position),
    /// See [`PresentationSink::update`].
    Update(EntityId, Position),
    /// See [`PresentationSink::remove`].
    Remove(EntityId),
}

impl PresentationEvent {
    /// The entity this event is about.
    #[must_use]
    pub const fn id(&self) -> EntityId {
        match *self {
            Self::Create(id, _) | Self::Update(id, _) | Self::Remove(id) => id,
        }
    }
}

/// Sink that keeps every event, in order.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    events: Vec<PresentationEvent>,
}

impl RecordingSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far.
    #[must_use]
    pub fn events(&self) -> &[PresentationEvent] {
        &self.events
    }

    /// Drains recorded events.
    pub fn take(&mut self) -> Vec<PresentationEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of `remove` events for one entity.
    #[must_use]
    pub fn removals_of(&self, id: EntityId) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, PresentationEvent::Remove(r) if *r == id))
            .count()
    }

    /// Most recent position shown for an entity, by `create` or `update`.
    #[must_use]
    pub fn last_position(&self, id: EntityId) -> Option<Position> {
        self.events.iter().rev().find_map(|e| match *e {
            PresentationEvent::Create(eid, pos) | PresentationEvent::Update(eid, pos) if eid == id => {
                Some(pos)
            }
            _ => None,
        })
    }
}

impl PresentationSink for RecordingSink {
    fn create(&mut self, id: EntityId, position: Position) {
        self.events.push(PresentationEvent::Create(id, position));
    }

    fn update(&mut self, id: EntityId, position: Position) {
        self.events.push(PresentationEvent::Update(id, position));
    }

    fn remove(&mut self, id: EntityId) {
        self.events.push(PresentationEvent::Remove(id));
    }
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn create(&mut self, _id: EntityId, _position: Position) {}

    fn update(&mut self, _id: EntityId, _position: Position) {}

    fn remove(&mut self, _id: EntityId) {}
}
