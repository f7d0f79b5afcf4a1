//! Tile coordinates and the tile spatial index.
//!
//! The index maps a lattice cell to the entity occupying it. It is shared
//! with other systems (queries, views) through [`TileIndexView`], which can
//! only read. Writes go through the single [`TileIndex`] owned by the tick
//! system, which keeps the index and the entity store in step: entities are
//! created before their entry is inserted, and entries are cleared when their
//! entity is removed.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard},
};

use serde::{Deserialize, Serialize};

use crate::{ecs::EntityId, math::Vec3};

/// Distance from a cell's lower boundary to its centre.
pub const HALF_CELL: f64 = 0.5;

/// Largest cell index on either axis. Every cell in `-MAX_CELL..=MAX_CELL` is
/// exactly representable as an `f64`, and its neighbours never overflow.
pub const MAX_CELL: i64 = 1 << 52;

/// A continuous position that does not map to a lattice cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoordError {
    NotFinite { x: f64, z: f64 },
    OutOfRange { x: f64, z: f64 },
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::NotFinite { x, z } => write!(f, "position ({x}, {z}) is not finite"),
            CoordError::OutOfRange { x, z } => {
                write!(f, "position ({x}, {z}) is outside the tile lattice (|cell| <= {MAX_CELL})")
            }
        }
    }
}

impl std::error::Error for CoordError {}

/// Integer lattice key of one tile cell.
///
/// `x` and `z` are the two planar axes. A continuous position maps to the cell
/// whose lower boundary it floors to; the cell's centre sits half a unit
/// further along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i64,
    pub z: i64,
}

impl TileCoord {
    pub const fn new(x: i64, z: i64) -> Self {
        Self { x, z }
    }

    /// Clamps a continuous planar position to its cell.
    ///
    /// Positions beyond the lattice saturate to its edge and NaN maps to 0;
    /// use [`TileCoord::try_clamp`] to reject them instead.
    pub fn clamp(x: f64, z: f64) -> Self {
        Self {
            x: clamp_axis(x),
            z: clamp_axis(z),
        }
    }

    /// Clamps a position to its cell, rejecting non-finite or out-of-lattice
    /// input.
    pub fn try_clamp(x: f64, z: f64) -> Result<Self, CoordError> {
        if !x.is_finite() || !z.is_finite() {
            return Err(CoordError::NotFinite { x, z });
        }
        let limit = MAX_CELL as f64;
        if x.floor().abs() > limit || z.floor().abs() > limit {
            return Err(CoordError::OutOfRange { x, z });
        }
        Ok(Self::clamp(x, z))
    }

    pub const fn offset(self, dx: i64, dz: i64) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            z: self.z.saturating_add(dz),
        }
    }

    /// Centre of the cell on the ground plane (`y = 0`).
    pub fn center(self) -> Vec3 {
        Vec3::new(self.x as f64 + HALF_CELL, 0.0, self.z as f64 + HALF_CELL)
    }
}

fn clamp_axis(v: f64) -> i64 {
    let limit = MAX_CELL as f64;
    v.floor().clamp(-limit, limit) as i64
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Tile index errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileIndexError {
    /// The cell already holds an entity.
    Occupied { coord: TileCoord, existing: EntityId },
}

impl fmt::Display for TileIndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileIndexError::Occupied { coord, existing } => {
                write!(f, "tile {coord} already occupied by entity {}", existing.0)
            }
        }
    }
}

impl std::error::Error for TileIndexError {}

type Cells = HashMap<TileCoord, EntityId>;

fn read_cells(cells: &RwLock<Cells>) -> RwLockReadGuard<'_, Cells> {
    cells.read().unwrap_or_else(PoisonError::into_inner)
}

fn occupied_neighbors(cells: &Cells, coord: TileCoord) -> Vec<TileCoord> {
    [
        coord.offset(-1, 0),
        coord.offset(1, 0),
        coord.offset(0, 1),
        coord.offset(0, -1),
    ]
    .into_iter()
    .filter(|c| cells.contains_key(c))
    .collect()
}

/// Writer half of the tile spatial index. Not `Clone`: there is one writer.
#[derive(Debug, Default)]
pub struct TileIndex {
    cells: Arc<RwLock<Cells>>,
}

impl TileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only handle for other systems.
    pub fn view(&self) -> TileIndexView {
        TileIndexView {
            cells: Arc::clone(&self.cells),
        }
    }

    pub fn get(&self, coord: TileCoord) -> Option<EntityId> {
        read_cells(&self.cells).get(&coord).copied()
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        read_cells(&self.cells).contains_key(&coord)
    }

    /// Associates `entity` with an empty cell.
    pub fn insert(&mut self, coord: TileCoord, entity: EntityId) -> Result<(), TileIndexError> {
        let mut cells = self.cells.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = cells.get(&coord) {
            return Err(TileIndexError::Occupied {
                coord,
                existing: *existing,
            });
        }
        cells.insert(coord, entity);
        Ok(())
    }

    pub fn remove(&mut self, coord: TileCoord) -> Option<EntityId> {
        self.cells
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&coord)
    }

    /// Occupied cardinal neighbours, in west, east, north, south order.
    pub fn neighbors(&self, coord: TileCoord) -> Vec<TileCoord> {
        occupied_neighbors(&read_cells(&self.cells), coord)
    }

    pub fn len(&self) -> usize {
        read_cells(&self.cells).len()
    }

    pub fn is_empty(&self) -> bool {
        read_cells(&self.cells).is_empty()
    }
}

/// Read-only, cloneable view of the tile index.
#[derive(Debug, Clone)]
pub struct TileIndexView {
    cells: Arc<RwLock<Cells>>,
}

impl TileIndexView {
    pub fn get(&self, coord: TileCoord) -> Option<EntityId> {
        read_cells(&self.cells).get(&coord).copied()
    }

    pub fn contains(&self, coord: TileCoord) -> bool {
        read_cells(&self.cells).contains_key(&coord)
    }

    /// Occupied cardinal neighbours, in west, east, north, south order.
    pub fn neighbors(&self, coord: TileCoord) -> Vec<TileCoord> {
        occupied_neighbors(&read_cells(&self.cells), coord)
    }

    pub fn len(&self) -> usize {
        read_cells(&self.cells).len()
    }

    pub fn is_empty(&self) -> bool {
        read_cells(&self.cells).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_floors_to_lower_boundary() {
        assert_eq!(TileCoord::clamp(3.2, 7.999), TileCoord::new(3, 7));
        assert_eq!(TileCoord::clamp(-0.25, -1.0), TileCoord::new(-1, -1));
        assert_eq!(TileCoord::clamp(4.0, 0.0), TileCoord::new(4, 0));
        assert_eq!(TileCoord::new(-1, 2).center(), Vec3::new(-0.5, 0.0, 2.5));
    }

    #[test]
    fn positions_off_the_lattice_are_rejected() {
        assert!(matches!(TileCoord::try_clamp(f64::NAN, 0.0), Err(CoordError::NotFinite { .. })));
        assert!(matches!(TileCoord::try_clamp(0.0, f64::INFINITY), Err(CoordError::NotFinite { .. })));
        assert!(matches!(TileCoord::try_clamp(1e300, 0.0), Err(CoordError::OutOfRange { .. })));
        assert_eq!(TileCoord::try_clamp(-2.5, 3.0), Ok(TileCoord::new(-3, 3)));

        let edge = TileCoord::clamp(1e300, -1e300);
        assert_eq!(edge, TileCoord::new(MAX_CELL, -MAX_CELL));
        assert_eq!(edge.offset(1, -1), TileCoord::new(MAX_CELL + 1, -MAX_CELL - 1));
        assert_eq!(TileCoord::new(i64::MAX, 0).offset(1, 0).x, i64::MAX);
    }

    #[test]
    fn insert_rejects_occupied_cells() {
        let mut index = TileIndex::new();
        let c = TileCoord::new(0, 0);
        index.insert(c, EntityId(1)).unwrap();

        assert_eq!(
            index.insert(c, EntityId(2)),
            Err(TileIndexError::Occupied {
                coord: c,
                existing: EntityId(1)
            })
        );
        assert_eq!(index.get(c), Some(EntityId(1)));
        assert_eq!(index.remove(c), Some(EntityId(1)));
        assert_eq!(index.remove(c), None);
        assert!(index.is_empty());
    }

    #[test]
    fn view_sees_writer_updates() {
        let mut index = TileIndex::new();
        let view = index.view();
        index.insert(TileCoord::new(5, 5), EntityId(9)).unwrap();

        let reader = std::thread::spawn({
            let view = view.clone();
            move || view.get(TileCoord::new(5, 5))
        });
        assert_eq!(reader.join().unwrap(), Some(EntityId(9)));
        assert!(view.contains(TileCoord::new(5, 5)));
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn neighbors_lists_occupied_cardinals_only() {
        let mut index = TileIndex::new();
        let center = TileCoord::new(10, -3);
        index.insert(center.offset(0, 1), EntityId(1)).unwrap();
        index.insert(center.offset(-1, 0), EntityId(2)).unwrap();
        index.insert(center.offset(1, 1), EntityId(3)).unwrap();

        assert_eq!(index.neighbors(center), vec![center.offset(-1, 0), center.offset(0, 1)]);
        assert_eq!(index.view().neighbors(center), index.neighbors(center));
    }
}
