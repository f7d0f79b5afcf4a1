//! The tile-world system.
//!
//! [`TileWorld`] owns the tile index, the session queue and the ingestion
//! queue, and borrows nothing: the entity store and the physics space are
//! injected through [`TileWorldBuilder`]. Once per tick [`TileWorld::update`]
//! flushes live edits, drains a throttled batch of ingestion jobs and queues
//! the resulting [`TileEvent`]s.

use std::fmt;

use tracing::{debug, info, warn};

use crate::{
    arena,
    clock::SimTime,
    components::{TileType, TileVariant},
    ecs::{ComponentFilter, EntityId, EntitySet, EntityStore, Position},
    entities,
    event::{EventBus, TileEvent},
    ingest::{self, IngestSummary, TileGrid},
    math::Vec3,
    physics::PhysicsSpace,
    session::SessionQueue,
    throttle::IngestQueue,
    tile::{CoordError, TileCoord, TileIndex, TileIndexView},
};

/// Name of the arena created by [`TileWorld::initialize`] unless overridden.
pub const DEFAULT_ARENA: &str = "default";

/// Wiring and lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    MissingStore,
    MissingSpace,
    AlreadyInitialized,
    NotInitialized,
    /// The store refused the default arena entity.
    Arena(String),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::MissingStore => write!(f, "tile world built without an entity store"),
            SetupError::MissingSpace => write!(f, "tile world built without a physics space"),
            SetupError::AlreadyInitialized => write!(f, "tile world already initialized"),
            SetupError::NotInitialized => write!(f, "tile world used before initialize"),
            SetupError::Arena(e) => write!(f, "default arena: {e}"),
        }
    }
}

impl std::error::Error for SetupError {}

/// What one `update` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub removed: usize,
    pub created: usize,
    pub ingested: usize,
    pub failed: usize,
    /// Ingestion jobs still waiting.
    pub pending_jobs: usize,
}

/// Builder for [`TileWorld`].
pub struct TileWorldBuilder<S, P> {
    store: Option<S>,
    space: Option<P>,
    arena_name: String,
}

impl<S: EntityStore, P: PhysicsSpace> TileWorldBuilder<S, P> {
    pub fn store(mut self, store: S) -> Self {
        self.store = Some(store);
        self
    }

    pub fn space(mut self, space: P) -> Self {
        self.space = Some(space);
        self
    }

    pub fn arena_name(mut self, name: impl Into<String>) -> Self {
        self.arena_name = name.into();
        self
    }

    pub fn build(self) -> Result<TileWorld<S, P>, SetupError> {
        Ok(TileWorld {
            store: self.store.ok_or(SetupError::MissingStore)?,
            space: self.space.ok_or(SetupError::MissingSpace)?,
            arena_name: self.arena_name,
            index: TileIndex::new(),
            session: SessionQueue::new(),
            jobs: IngestQueue::new(),
            events: EventBus::default(),
            tiles: None,
            arena: None,
            now: 0,
        })
    }
}

/// Tile-world system over an injected store and physics space.
pub struct TileWorld<S, P> {
    store: S,
    space: P,
    arena_name: String,
    index: TileIndex,
    session: SessionQueue,
    jobs: IngestQueue,
    events: EventBus,
    /// Live view of every positioned tile; `Some` once initialised.
    tiles: Option<EntitySet>,
    arena: Option<EntityId>,
    now: i64,
}

impl<S: EntityStore, P: PhysicsSpace> TileWorld<S, P> {
    pub fn builder() -> TileWorldBuilder<S, P> {
        TileWorldBuilder {
            store: None,
            space: None,
            arena_name: DEFAULT_ARENA.to_string(),
        }
    }

    /// Creates the default arena and starts watching tiles.
    pub fn initialize(&mut self, time: &SimTime) -> Result<(), SetupError> {
        if self.tiles.is_some() {
            return Err(SetupError::AlreadyInitialized);
        }
        self.now = time.time;

        let arena = entities::spawn_arena(&mut self.store, &self.arena_name, Vec3::ZERO, time.time)
            .map_err(|e| SetupError::Arena(e.to_string()))?;
        self.arena = Some(arena);
        self.tiles = Some(
            self.store
                .entities(ComponentFilter::new().with::<TileType>().with::<Position>()),
        );

        info!(arena = %self.arena_name, entity = ?arena, "Tile world initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.tiles.is_some()
    }

    /// Queues a live tile at the cell covering `(x, z)`. Non-finite or
    /// out-of-lattice positions are refused and nothing is queued.
    pub fn request_creation(&mut self, x: f64, z: f64) -> Result<TileCoord, CoordError> {
        let coord = self.session.request_creation(x, z).inspect_err(|e| {
            warn!(error = %e, "Tile creation refused");
        })?;
        debug!(%coord, "Tile creation requested");
        Ok(coord)
    }

    /// Queues removal of the tile covering `(x, z)`.
    pub fn request_removal(&mut self, x: f64, z: f64) -> Result<TileCoord, CoordError> {
        let coord = self.session.request_removal(x, z).inspect_err(|e| {
            warn!(error = %e, "Tile removal refused");
        })?;
        debug!(%coord, "Tile removal requested");
        Ok(coord)
    }

    /// Scans a legacy tile grid: special tiles are created now, the rest are
    /// queued for the throttle.
    pub fn ingest_legacy_map(&mut self, grid: &TileGrid, source: &str, offset: Vec3) -> IngestSummary {
        ingest::ingest(
            grid,
            source,
            offset,
            self.now,
            &mut self.store,
            &mut self.space,
            &mut self.jobs,
        )
    }

    /// Runs one tick: session flush, then one throttled ingestion batch.
    pub fn update(&mut self, time: &SimTime) -> Result<TickReport, SetupError> {
        let Some(tiles) = self.tiles.as_mut() else {
            return Err(SetupError::NotInitialized);
        };
        self.now = time.time;

        let flush = self
            .session
            .flush(&mut self.index, &mut self.store, &mut self.space, time.time);
        let drain = self
            .jobs
            .drain_tick(&mut self.index, &mut self.store, &mut self.space);

        for (coord, entity) in &flush.removed {
            self.events.push(TileEvent::Removed {
                coord: *coord,
                entity: *entity,
            });
        }
        for (coord, entity, mask) in &flush.created {
            self.events.push(TileEvent::Created {
                coord: *coord,
                entity: *entity,
                mask: *mask,
            });
        }
        for (coord, entity) in &drain.placed {
            self.events.push(TileEvent::Ingested {
                coord: *coord,
                entity: *entity,
            });
        }
        for _ in 0..drain.failed {
            self.events.push(TileEvent::IngestFailed);
        }

        if tiles.apply_changes(&self.store) {
            debug!(
                frame = time.frame,
                added = tiles.added().len(),
                changed = tiles.changed().len(),
                removed = tiles.removed().len(),
                "Tile set changed"
            );
        }
        // The tile view is the only reader of the store's change log.
        self.store.release_changes(tiles.cursor());

        Ok(TickReport {
            removed: flush.removed.len(),
            created: flush.created.len(),
            ingested: drain.placed.len(),
            failed: flush.failed + drain.failed,
            pending_jobs: self.jobs.len(),
        })
    }

    /// Read-only handle on the tile index for other systems.
    pub fn index_view(&self) -> TileIndexView {
        self.index.view()
    }

    /// Entity occupying the cell covering `(x, z)`.
    ///
    /// Live edits and legacy maps share one index. Legacy tiles are keyed on
    /// their world x and y (see [`IngestionJob::coord`](crate::ingest::IngestionJob::coord)),
    /// so a legacy tile at world `(x, y, 0)` answers here as cell `(x, y)`.
    pub fn entity_id(&self, x: f64, z: f64) -> Option<EntityId> {
        TileCoord::try_clamp(x, z).ok().and_then(|c| self.index.get(c))
    }

    /// Occupied cardinal neighbours (W, E, N, S) of the cell covering `(x, z)`.
    /// Legacy and live tiles neighbour each other on the shared lattice.
    pub fn neighbors(&self, x: f64, z: f64) -> Vec<TileCoord> {
        TileCoord::try_clamp(x, z)
            .map(|c| self.index.neighbors(c))
            .unwrap_or_default()
    }

    /// Wang-blob mask last written for the tile covering `(x, z)`.
    pub fn variant(&self, x: f64, z: f64) -> Option<u8> {
        self.entity_id(x, z)
            .and_then(|e| self.store.get::<TileVariant>(e))
            .map(|v| v.mask)
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Session requests not flushed yet: (removals, creations).
    pub fn pending_requests(&self) -> (usize, usize) {
        (self.session.pending_removals(), self.session.pending_creations())
    }

    pub fn center_of_arena(&self, x: f64, z: f64) -> Vec3 {
        arena::center_of_arena(x, z)
    }

    /// Drains the tile events queued by previous updates.
    pub fn drain_events(&mut self) -> Vec<TileEvent> {
        self.events.drain::<TileEvent>()
    }

    /// Indexed tiles.
    pub fn tile_count(&self) -> usize {
        self.index.len()
    }

    /// Entities carrying a tile type and a position, as of the last update.
    pub fn watched_tiles(&self) -> usize {
        self.tiles.as_ref().map_or(0, EntitySet::len)
    }

    pub fn arena(&self) -> Option<EntityId> {
        self.arena
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn space(&self) -> &P {
        &self.space
    }
}
