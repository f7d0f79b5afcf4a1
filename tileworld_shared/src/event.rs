//! Tile-world events.
//!
//! A small typed event bus. The tile world pushes [`TileEvent`]s as it
//! mutates the lattice; the host drains them once per tick (logging, console
//! feedback, tests).

use std::{
    any::{Any, TypeId},
    collections::HashMap,
};

use crate::{ecs::EntityId, tile::TileCoord};

/// Typed event bus.
#[derive(Default)]
pub struct EventBus {
    queues: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl EventBus {
    /// Pushes an event into the queue.
    pub fn push<E: 'static + Send + Sync>(&mut self, e: E) {
        let q = self
            .queues
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(Vec::<E>::new()));
        let q = q.downcast_mut::<Vec<E>>().expect("queue type mismatch");
        q.push(e);
    }

    /// Drains all queued events of a type.
    pub fn drain<E: 'static + Send + Sync>(&mut self) -> Vec<E> {
        self.queues
            .remove(&TypeId::of::<E>())
            .and_then(|boxed| boxed.downcast::<Vec<E>>().ok())
            .map(|boxed| *boxed)
            .unwrap_or_default()
    }

    /// Number of queued events of a type.
    pub fn pending<E: 'static + Send + Sync>(&self) -> usize {
        self.queues
            .get(&TypeId::of::<E>())
            .and_then(|q| q.downcast_ref::<Vec<E>>())
            .map_or(0, Vec::len)
    }
}

/// Something that happened to the tile lattice this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileEvent {
    /// A live-edited tile was created and tagged with `mask`.
    Created { coord: TileCoord, entity: EntityId, mask: u8 },
    /// A tile was removed from the lattice.
    Removed { coord: TileCoord, entity: EntityId },
    /// A queued legacy map tile was placed.
    Ingested { coord: TileCoord, entity: EntityId },
    /// A queued legacy map tile was dropped after failing.
    IngestFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_is_per_type_and_empties_queue() {
        let mut bus = EventBus::default();
        bus.push(TileEvent::IngestFailed);
        bus.push(7_u32);
        bus.push(TileEvent::Removed {
            coord: TileCoord::new(1, 2),
            entity: EntityId(3),
        });

        assert_eq!(bus.pending::<TileEvent>(), 2);
        assert_eq!(bus.drain::<TileEvent>().len(), 2);
        assert!(bus.drain::<TileEvent>().is_empty());
        assert_eq!(bus.drain::<u32>(), vec![7]);
    }
}
