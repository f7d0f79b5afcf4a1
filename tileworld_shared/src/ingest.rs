//! Legacy map ingestion.
//!
//! Converts a grid of legacy tile codes into world entities. A few codes stand
//! for objects rather than walls and are created on the spot; every other
//! non-empty cell becomes an [`IngestionJob`] queued for the throttle, so a
//! full 1024x1024 map never lands in a single tick.
//!
//! Legacy maps lie in the x/y plane: grid cell `(x, y)` is placed at
//! `(x, -y, 0) + offset`, and its tile key is taken from the location's x and
//! y.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    components::TileKind,
    ecs::{EntityId, EntityStore},
    entities,
    math::Vec3,
    physics::PhysicsSpace,
    throttle::IngestQueue,
    tile::TileCoord,
};

/// Turf flag (capture point).
pub const TURF_FLAG: u16 = 170;
pub const SMALL_ASTEROID: u16 = 216;
pub const LARGE_ASTEROID: u16 = 217;
pub const SPACE_STATION: u16 = 219;
pub const WORMHOLE: u16 = 220;

/// Tile codes that are not plain map tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialTile {
    TurfFlag,
    /// Asteroid of the given size class.
    Asteroid(u8),
    /// Recognised, not materialised yet.
    Station,
    /// Recognised, not materialised yet.
    Wormhole,
}

impl SpecialTile {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            TURF_FLAG => Some(SpecialTile::TurfFlag),
            SMALL_ASTEROID => Some(SpecialTile::Asteroid(1)),
            LARGE_ASTEROID => Some(SpecialTile::Asteroid(2)),
            SPACE_STATION => Some(SpecialTile::Station),
            WORMHOLE => Some(SpecialTile::Wormhole),
            _ => None,
        }
    }
}

/// Rectangular grid of legacy tile codes, addressed `(x, y)`; 0 is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    width: usize,
    height: usize,
    /// Column-major: column `x` occupies `cells[x * height..(x + 1) * height]`.
    cells: Vec<u16>,
}

impl TileGrid {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![0; width * height],
        }
    }

    /// Builds a grid from columns; short columns are padded with empty cells.
    pub fn from_columns(columns: &[Vec<u16>]) -> Self {
        let height = columns.iter().map(Vec::len).max().unwrap_or(0);
        let mut grid = Self::new(columns.len(), height);
        for (x, column) in columns.iter().enumerate() {
            for (y, code) in column.iter().enumerate() {
                grid.set(x, y, *code);
            }
        }
        grid
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Code at `(x, y)`; cells outside the grid read as empty.
    pub fn get(&self, x: usize, y: usize) -> u16 {
        if x < self.width && y < self.height {
            self.cells[x * self.height + y]
        } else {
            0
        }
    }

    /// Sets the code at `(x, y)`. Returns `false` outside the grid.
    pub fn set(&mut self, x: usize, y: usize, code: u16) -> bool {
        if x < self.width && y < self.height {
            self.cells[x * self.height + y] = code;
            true
        } else {
            false
        }
    }

    /// Number of non-empty cells.
    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|c| **c != 0).count()
    }
}

/// One deferred map-tile creation.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestionJob {
    /// Level file the tile came from.
    pub source: Arc<str>,
    pub code: u16,
    pub location: Vec3,
    pub kind: TileKind,
    /// Simulation time at which the job was queued.
    pub created_at: i64,
}

impl IngestionJob {
    /// Cell the tile will occupy: the location's x and y. Legacy maps lie on
    /// the x/y plane while live edits key on x/z, and both share one index.
    pub fn coord(&self) -> TileCoord {
        TileCoord::clamp(self.location.x, self.location.y)
    }

    /// Creates the tile entity and attaches its body. Does not touch the tile
    /// index.
    pub fn execute<S: EntityStore, P: PhysicsSpace>(&self, store: &mut S, space: &mut P) -> anyhow::Result<EntityId> {
        let entity = entities::spawn_map_tile(
            store,
            space,
            &self.source,
            self.code,
            self.location,
            self.kind,
            self.created_at,
        )?;
        debug!(entity = ?entity, code = self.code, source = %self.source, "Map tile created");
        Ok(entity)
    }
}

/// What a grid scan did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Generic tiles handed to the throttle.
    pub queued: usize,
    /// Special entities created directly.
    pub spawned: usize,
    /// Recognised codes with nothing to create.
    pub ignored: usize,
    /// Special entities that failed to build.
    pub failed: usize,
}

/// Scans `grid` column by column (bottom row first within each column),
/// creating special entities directly and queueing the rest.
pub fn ingest<S: EntityStore, P: PhysicsSpace>(
    grid: &TileGrid,
    source: &str,
    offset: Vec3,
    now: i64,
    store: &mut S,
    space: &mut P,
    queue: &mut IngestQueue,
) -> IngestSummary {
    let source: Arc<str> = Arc::from(source);
    let mut summary = IngestSummary::default();

    for x in 0..grid.width() {
        for y in (0..grid.height()).rev() {
            let code = grid.get(x, y);
            if code == 0 {
                continue;
            }
            let location = Vec3::new(x as f64, -(y as f64), 0.0) + offset;

            let spawned = match SpecialTile::from_code(code) {
                Some(SpecialTile::TurfFlag) => entities::spawn_capture_flag(store, space, location, now),
                Some(SpecialTile::Asteroid(size)) => entities::spawn_asteroid(store, space, location, size, now),
                Some(SpecialTile::Station | SpecialTile::Wormhole) => {
                    summary.ignored += 1;
                    continue;
                }
                None => {
                    queue.push(IngestionJob {
                        source: Arc::clone(&source),
                        code,
                        location,
                        kind: TileKind::Legacy,
                        created_at: now,
                    });
                    summary.queued += 1;
                    continue;
                }
            };

            match spawned {
                Ok(_) => summary.spawned += 1,
                Err(e) => {
                    warn!(code, x, y, error = %format!("{e:#}"), "Special tile failed");
                    summary.failed += 1;
                }
            }
        }
    }

    info!(
        source = %source,
        queued = summary.queued,
        spawned = summary.spawned,
        ignored = summary.ignored,
        failed = summary.failed,
        "Legacy map scanned"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        components::ObjectType,
        ecs::{Position, World},
        physics::NullSpace,
    };

    #[test]
    fn special_codes_dispatch_and_rest_queue() {
        let grid = TileGrid::from_columns(&[
            vec![1, 0, TURF_FLAG],
            vec![SMALL_ASTEROID, LARGE_ASTEROID, SPACE_STATION],
            vec![WORMHOLE, 218, 0],
        ]);
        let mut world = World::default();
        let mut queue = IngestQueue::default();

        let summary = ingest(&grid, "test.lvl", Vec3::ZERO, 7, &mut world, &mut NullSpace, &mut queue);

        assert_eq!(
            summary,
            IngestSummary {
                queued: 2,
                spawned: 3,
                ignored: 2,
                failed: 0
            }
        );
        assert_eq!(queue.len(), 2);
        assert_eq!(world.len(), 3);

        let mut asteroids: Vec<u8> = world
            .iter::<ObjectType>()
            .filter_map(|(_, t)| match t {
                ObjectType::Asteroid(size) => Some(*size),
                _ => None,
            })
            .collect();
        asteroids.sort();
        assert_eq!(asteroids, vec![1, 2]);
    }

    #[test]
    fn scan_is_column_major_bottom_up_with_offset() {
        let grid = TileGrid::from_columns(&[vec![5, 6], vec![7, 8]]);
        let mut world = World::default();
        let mut queue = IngestQueue::default();
        let offset = Vec3::new(-512.0, 512.0, 0.0);

        ingest(&grid, "map.lvl", offset, 0, &mut world, &mut NullSpace, &mut queue);

        let jobs: Vec<(u16, Vec3)> = queue.iter().map(|j| (j.code, j.location)).collect();
        assert_eq!(
            jobs,
            vec![
                (6, Vec3::new(-512.0, 511.0, 0.0)),
                (5, Vec3::new(-512.0, 512.0, 0.0)),
                (8, Vec3::new(-511.0, 511.0, 0.0)),
                (7, Vec3::new(-511.0, 512.0, 0.0)),
            ]
        );
        assert!(queue.iter().all(|j| j.kind == TileKind::Legacy && &*j.source == "map.lvl"));
        assert_eq!(queue.iter().next().unwrap().coord(), TileCoord::new(-512, 511));
    }

    #[test]
    fn capture_flag_lands_at_location() {
        let grid = TileGrid::from_columns(&[vec![0, TURF_FLAG]]);
        let mut world = World::default();
        let mut queue = IngestQueue::default();

        ingest(&grid, "flag.lvl", Vec3::new(10.0, 0.0, 0.0), 0, &mut world, &mut NullSpace, &mut queue);

        let (flag, _) = world
            .iter::<ObjectType>()
            .find(|(_, t)| **t == ObjectType::CaptureFlag)
            .unwrap();
        assert_eq!(world.get::<Position>(flag), Some(&Position { x: 10.0, y: -1.0, z: 0.0 }));
        assert!(queue.is_empty());
    }

    #[test]
    fn grid_reads_outside_are_empty() {
        let mut grid = TileGrid::new(2, 3);
        assert!(grid.set(1, 2, 9));
        assert!(!grid.set(2, 0, 9));
        assert_eq!(grid.get(1, 2), 9);
        assert_eq!(grid.get(5, 5), 0);
        assert_eq!(grid.occupied(), 1);
    }
}
