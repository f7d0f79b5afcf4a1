//! Session mutation queue.
//!
//! Live tile edits (player building or breaking tiles) are collected during a
//! tick and applied once per tick by [`SessionQueue::flush`]: all removals
//! first, then all creations. Requests are keyed by clamped cell, so repeated
//! requests for the same cell within a tick collapse into one.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::{
    autotile,
    ecs::{EntityId, EntityStore},
    entities,
    physics::PhysicsSpace,
    tile::{CoordError, TileCoord, TileIndex},
};

/// Outcome of one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub removed: Vec<(TileCoord, EntityId)>,
    /// Created tiles with the mask they were tagged with.
    pub created: Vec<(TileCoord, EntityId, u8)>,
    /// Creation requests for cells that were already occupied.
    pub skipped: usize,
    /// Creation requests whose entity could not be built.
    pub failed: usize,
}

/// Pending per-tick tile edits.
#[derive(Debug, Default)]
pub struct SessionQueue {
    removals: BTreeSet<TileCoord>,
    creations: BTreeSet<TileCoord>,
}

impl SessionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues removal of the tile covering `(x, z)`.
    pub fn request_removal(&mut self, x: f64, z: f64) -> Result<TileCoord, CoordError> {
        let coord = TileCoord::try_clamp(x, z)?;
        self.removals.insert(coord);
        Ok(coord)
    }

    /// Queues creation of a tile covering `(x, z)`.
    pub fn request_creation(&mut self, x: f64, z: f64) -> Result<TileCoord, CoordError> {
        let coord = TileCoord::try_clamp(x, z)?;
        self.creations.insert(coord);
        Ok(coord)
    }

    pub fn pending_removals(&self) -> usize {
        self.removals.len()
    }

    pub fn pending_creations(&self) -> usize {
        self.creations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.creations.is_empty()
    }

    /// Applies every pending edit. Both sets are empty afterwards, whatever
    /// happened to the individual requests.
    pub fn flush<S: EntityStore, P: PhysicsSpace>(
        &mut self,
        index: &mut TileIndex,
        store: &mut S,
        space: &mut P,
        now: i64,
    ) -> FlushReport {
        let mut report = FlushReport::default();

        for coord in std::mem::take(&mut self.removals) {
            if let Some(entity) = index.get(coord) {
                space.detach(entity);
                store.remove_entity(entity);
                index.remove(coord);
                report.removed.push((coord, entity));
            }
            autotile::recompute(index, store, &[coord], true, false);
        }

        for coord in std::mem::take(&mut self.creations) {
            if index.contains(coord) {
                debug!(%coord, "Tile already present, creation skipped");
                report.skipped += 1;
                continue;
            }

            let entity = match entities::spawn_wang_blob_tile(store, space, coord, now) {
                Ok(entity) => entity,
                Err(e) => {
                    warn!(%coord, error = %format!("{e:#}"), "Tile creation failed");
                    report.failed += 1;
                    continue;
                }
            };
            if let Err(e) = index.insert(coord, entity) {
                warn!(%coord, error = %e, "Tile index rejected new tile");
                space.detach(entity);
                store.remove_entity(entity);
                report.failed += 1;
                continue;
            }

            let mask = autotile::recompute(index, store, &[coord], true, true);
            report.created.push((coord, entity, mask));
        }

        report
    }
}
