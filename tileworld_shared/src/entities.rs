//! Entity constructors for the tile world.
//!
//! Each constructor creates the entity, sets its components and attaches its
//! body to the physics space as one step: if any part fails, the entity is
//! removed again before the error is returned.

use anyhow::Context;

use crate::{
    components::{BodyShape, Name, ObjectType, SpawnTime, TileKind, TileType},
    ecs::{EntityId, EntityStore, Position, StoreError},
    math::Vec3,
    physics::PhysicsSpace,
    tile::TileCoord,
};

/// Edge length of a map tile body.
pub const TILE_BODY_SIZE: f64 = 1.0;
/// Radius of a small (size 1) asteroid; larger sizes scale linearly.
pub const ASTEROID_RADIUS: f64 = 0.5;

fn spawn_body<S, P, F>(store: &mut S, space: &mut P, shape: BodyShape, at: Vec3, init: F) -> anyhow::Result<EntityId>
where
    S: EntityStore,
    P: PhysicsSpace,
    F: FnOnce(&mut S, EntityId) -> Result<(), StoreError>,
{
    let entity = store.create_entity();
    let built = init(store, entity)
        .and_then(|()| store.set_component(entity, Position::from(at)))
        .and_then(|()| store.set_component(entity, shape))
        .map_err(anyhow::Error::from)
        .and_then(|()| space.attach(entity, shape, at));

    if let Err(e) = built {
        store.remove_entity(entity);
        return Err(e);
    }
    Ok(entity)
}

/// Map tile converted from a legacy level.
pub fn spawn_map_tile<S: EntityStore, P: PhysicsSpace>(
    store: &mut S,
    space: &mut P,
    source: &str,
    code: u16,
    location: Vec3,
    kind: TileKind,
    now: i64,
) -> anyhow::Result<EntityId> {
    let tile_type = match kind {
        TileKind::Legacy => TileType::legacy(source, code),
        TileKind::WangBlob => TileType::wang_blob(source),
    };
    spawn_body(store, space, BodyShape::Square(TILE_BODY_SIZE), location, |store, e| {
        store.set_component(e, ObjectType::MapTile)?;
        store.set_component(e, tile_type)?;
        store.set_component(e, SpawnTime(now))
    })
    .with_context(|| format!("spawn map tile {code} from {source}"))
}

/// Live-edited wang-blob tile centred in `coord`. Its variant is set by the
/// auto-tiler once it is indexed.
pub fn spawn_wang_blob_tile<S: EntityStore, P: PhysicsSpace>(
    store: &mut S,
    space: &mut P,
    coord: TileCoord,
    now: i64,
) -> anyhow::Result<EntityId> {
    spawn_body(store, space, BodyShape::Square(TILE_BODY_SIZE), coord.center(), |store, e| {
        store.set_component(e, ObjectType::MapTile)?;
        store.set_component(e, TileType::wang_blob(""))?;
        store.set_component(e, SpawnTime(now))
    })
    .with_context(|| format!("spawn wang-blob tile at {coord}"))
}

/// Turf flag: a capture point.
pub fn spawn_capture_flag<S: EntityStore, P: PhysicsSpace>(
    store: &mut S,
    space: &mut P,
    location: Vec3,
    now: i64,
) -> anyhow::Result<EntityId> {
    spawn_body(store, space, BodyShape::Square(TILE_BODY_SIZE), location, |store, e| {
        store.set_component(e, ObjectType::CaptureFlag)?;
        store.set_component(e, SpawnTime(now))
    })
    .context("spawn capture flag")
}

/// Decorative asteroid hazard of the given size class.
pub fn spawn_asteroid<S: EntityStore, P: PhysicsSpace>(
    store: &mut S,
    space: &mut P,
    location: Vec3,
    size: u8,
    now: i64,
) -> anyhow::Result<EntityId> {
    let shape = BodyShape::Circle(ASTEROID_RADIUS * f64::from(size));
    spawn_body(store, space, shape, location, |store, e| {
        store.set_component(e, ObjectType::Asteroid(size))?;
        store.set_component(e, SpawnTime(now))
    })
    .with_context(|| format!("spawn asteroid of size {size}"))
}

/// Arena marker. Arenas have no body.
pub fn spawn_arena<S: EntityStore>(store: &mut S, name: &str, location: Vec3, now: i64) -> Result<EntityId, StoreError> {
    let entity = store.create_entity();
    store.set_component(entity, ObjectType::Arena)?;
    store.set_component(entity, Name(name.to_string()))?;
    store.set_component(entity, Position::from(location))?;
    store.set_component(entity, SpawnTime(now))?;
    Ok(entity)
}
