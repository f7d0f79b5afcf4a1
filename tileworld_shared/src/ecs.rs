//! Entity/component store.
//!
//! The tile world never owns its entities. It talks to an [`EntityStore`]
//! capability: create an entity, set components on it, remove it, and watch a
//! filtered [`EntitySet`] for changes. [`World`] is the in-memory store used by
//! the server and by tests. It is not archetype-based; it keeps typed component
//! storages keyed by entity id plus a change log that live views replay. The
//! owner of the views releases records they have all consumed
//! ([`EntityStore::release_changes`]); a view that falls behind the released
//! prefix rebuilds its membership from the live entities.

use std::{
    any::{Any, TypeId},
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    ops::Range,
};

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Opaque entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Anything that can be attached to an entity.
pub trait Component: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Component for T {}

/// What happened to an entity in one change-log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A component of the given type was inserted or replaced.
    Set(TypeId),
    /// The entity and all of its components were removed.
    Removed,
}

/// One change-log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentChange {
    pub entity: EntityId,
    pub kind: ChangeKind,
}

/// Entity store errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    NoSuchEntity(EntityId),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NoSuchEntity(id) => write!(f, "no such entity: {}", id.0),
        }
    }
}

impl std::error::Error for StoreError {}

/// Entity-data store capability consumed by the tile world.
pub trait EntityStore {
    /// Creates a new, component-less entity.
    fn create_entity(&mut self) -> EntityId;

    /// Inserts/replaces a component. Fails if the entity is not alive.
    fn set_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<(), StoreError>;

    /// Removes an entity and all of its components. Returns `false` if it was
    /// not alive.
    fn remove_entity(&mut self, entity: EntityId) -> bool;

    /// Gets a component reference.
    fn get<T: Component>(&self, entity: EntityId) -> Option<&T>;

    fn is_alive(&self, entity: EntityId) -> bool;

    /// Whether the entity carries a component of the given type.
    fn has_component(&self, entity: EntityId, ty: TypeId) -> bool;

    /// Retained change-log records with a sequence number of at least
    /// `cursor`.
    fn changes_since(&self, cursor: usize) -> &[ComponentChange];

    /// Sequence numbers of the retained records: the oldest one, and the one
    /// the next record will get.
    fn change_log(&self) -> Range<usize>;

    /// Drops retained records numbered below `upto`.
    fn release_changes(&mut self, upto: usize);

    /// Every live entity.
    fn entity_ids(&self) -> Vec<EntityId>;

    /// Opens a live view over every entity matching `filter`.
    fn entities(&self, filter: ComponentFilter) -> EntitySet
    where
        Self: Sized,
    {
        EntitySet::new(filter, self)
    }
}

trait Storage: Send + Sync {
    fn remove(&mut self, entity: EntityId) -> bool;
    fn contains(&self, entity: EntityId) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> Storage for HashMap<EntityId, T> {
    fn remove(&mut self, entity: EntityId) -> bool {
        HashMap::remove(self, &entity).is_some()
    }

    fn contains(&self, entity: EntityId) -> bool {
        self.contains_key(&entity)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// In-memory entity store.
#[derive(Default)]
pub struct World {
    next_id: u64,
    alive: HashSet<EntityId>,
    storages: HashMap<TypeId, Box<dyn Storage>>,
    changes: Vec<ComponentChange>,
    /// Sequence number of `changes[0]`.
    released: usize,
}

impl World {
    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.alive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alive.is_empty()
    }

    /// Change-log records still held.
    pub fn retained_changes(&self) -> usize {
        self.changes.len()
    }

    /// Gets a mutable component reference.
    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.storages
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.as_any_mut().downcast_mut::<HashMap<EntityId, T>>())
            .and_then(|storage| storage.get_mut(&entity))
    }

    /// Iterates entities with a given component.
    pub fn iter<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.storages
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.as_any().downcast_ref::<HashMap<EntityId, T>>())
            .into_iter()
            .flat_map(|storage| storage.iter().map(|(k, v)| (*k, v)))
    }
}

impl EntityStore for World {
    fn create_entity(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        self.alive.insert(id);
        id
    }

    fn set_component<T: Component>(&mut self, entity: EntityId, component: T) -> Result<(), StoreError> {
        if !self.alive.contains(&entity) {
            return Err(StoreError::NoSuchEntity(entity));
        }

        let storage = self
            .storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(HashMap::<EntityId, T>::new()));

        let storage = storage
            .as_any_mut()
            .downcast_mut::<HashMap<EntityId, T>>()
            .expect("storage type mismatch");

        storage.insert(entity, component);
        self.changes.push(ComponentChange {
            entity,
            kind: ChangeKind::Set(TypeId::of::<T>()),
        });
        Ok(())
    }

    fn remove_entity(&mut self, entity: EntityId) -> bool {
        if !self.alive.remove(&entity) {
            return false;
        }
        for storage in self.storages.values_mut() {
            storage.remove(entity);
        }
        self.changes.push(ComponentChange {
            entity,
            kind: ChangeKind::Removed,
        });
        true
    }

    fn get<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.storages
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.as_any().downcast_ref::<HashMap<EntityId, T>>())
            .and_then(|storage| storage.get(&entity))
    }

    fn is_alive(&self, entity: EntityId) -> bool {
        self.alive.contains(&entity)
    }

    fn has_component(&self, entity: EntityId, ty: TypeId) -> bool {
        self.storages
            .get(&ty)
            .is_some_and(|storage| storage.contains(entity))
    }

    fn changes_since(&self, cursor: usize) -> &[ComponentChange] {
        let start = cursor.saturating_sub(self.released).min(self.changes.len());
        &self.changes[start..]
    }

    fn change_log(&self) -> Range<usize> {
        self.released..self.released + self.changes.len()
    }

    fn release_changes(&mut self, upto: usize) {
        let n = upto.saturating_sub(self.released).min(self.changes.len());
        self.changes.drain(..n);
        self.released += n;
    }

    fn entity_ids(&self) -> Vec<EntityId> {
        self.alive.iter().copied().collect()
    }
}

/// Set of component types an entity must carry to be part of a view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentFilter {
    types: Vec<TypeId>,
}

impl ComponentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires component `T`.
    pub fn with<T: Component>(mut self) -> Self {
        let ty = TypeId::of::<T>();
        if !self.types.contains(&ty) {
            self.types.push(ty);
        }
        self
    }

    fn watches(&self, ty: TypeId) -> bool {
        self.types.contains(&ty)
    }

    fn matches<S: EntityStore + ?Sized>(&self, store: &S, entity: EntityId) -> bool {
        store.is_alive(entity) && self.types.iter().all(|ty| store.has_component(entity, *ty))
    }
}

/// Live view over the entities matching a [`ComponentFilter`].
///
/// The view only moves forward when [`EntitySet::apply_changes`] is called;
/// in between, it reports the membership as of the last call.
#[derive(Debug, Clone)]
pub struct EntitySet {
    filter: ComponentFilter,
    members: BTreeSet<EntityId>,
    cursor: usize,
    added: Vec<EntityId>,
    changed: Vec<EntityId>,
    removed: Vec<EntityId>,
}

impl EntitySet {
    pub fn new<S: EntityStore + ?Sized>(filter: ComponentFilter, store: &S) -> Self {
        let mut set = Self {
            filter,
            members: BTreeSet::new(),
            cursor: 0,
            added: Vec::new(),
            changed: Vec::new(),
            removed: Vec::new(),
        };
        set.apply_changes(store);
        set.added.clear();
        set.changed.clear();
        set
    }

    /// Replays the store's change log since the last call. Returns `true` if
    /// anything was added, changed or removed.
    pub fn apply_changes<S: EntityStore + ?Sized>(&mut self, store: &S) -> bool {
        self.added.clear();
        self.changed.clear();
        self.removed.clear();

        let log = store.change_log();
        if self.cursor < log.start {
            self.rebuild(store);
            self.cursor = log.end;
            return !(self.added.is_empty() && self.removed.is_empty());
        }

        let changes = store.changes_since(self.cursor);
        self.cursor = log.end;

        let touched: BTreeSet<EntityId> = changes
            .iter()
            .filter(|c| match c.kind {
                ChangeKind::Set(ty) => self.filter.watches(ty),
                ChangeKind::Removed => true,
            })
            .map(|c| c.entity)
            .collect();

        for entity in touched {
            let was_member = self.members.contains(&entity);
            let is_member = self.filter.matches(store, entity);
            match (was_member, is_member) {
                (false, true) => {
                    self.members.insert(entity);
                    self.added.push(entity);
                }
                (true, true) => self.changed.push(entity),
                (true, false) => {
                    self.members.remove(&entity);
                    self.removed.push(entity);
                }
                (false, false) => {}
            }
        }

        !(self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty())
    }

    /// Records below the cursor have been replayed; live members changed
    /// while the view was behind are not reported as changed.
    fn rebuild<S: EntityStore + ?Sized>(&mut self, store: &S) {
        let now: BTreeSet<EntityId> = store
            .entity_ids()
            .into_iter()
            .filter(|e| self.filter.matches(store, *e))
            .collect();
        self.added.extend(now.difference(&self.members).copied());
        self.removed.extend(self.members.difference(&now).copied());
        self.members = now;
    }

    /// Sequence number of the next change-log record this view will replay.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.members.contains(&entity)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in id order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.members.iter().copied()
    }

    pub fn added(&self) -> &[EntityId] {
        &self.added
    }

    pub fn changed(&self) -> &[EntityId] {
        &self.changed
    }

    pub fn removed(&self) -> &[EntityId] {
        &self.removed
    }
}

/// Common component: world position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl From<Vec3> for Position {
    fn from(v: Vec3) -> Self {
        Self {
            x: v.x,
            y: v.y,
            z: v.z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Marker;

    #[test]
    fn ecs_insert_and_get() {
        let mut world = World::default();
        let e = world.create_entity();
        world.set_component(e, Position { x: 1.0, y: 2.0, z: 3.0 }).unwrap();
        assert_eq!(world.get::<Position>(e).unwrap().x, 1.0);
    }

    #[test]
    fn removed_entity_loses_components_and_rejects_writes() {
        let mut world = World::default();
        let e = world.create_entity();
        world.set_component(e, Marker).unwrap();

        assert!(world.remove_entity(e));
        assert!(!world.remove_entity(e));
        assert!(world.get::<Marker>(e).is_none());
        assert_eq!(world.set_component(e, Marker), Err(StoreError::NoSuchEntity(e)));
    }

    #[test]
    fn entity_set_tracks_added_changed_removed() {
        let mut world = World::default();
        let a = world.create_entity();
        world.set_component(a, Marker).unwrap();
        world.set_component(a, Position::default()).unwrap();

        let mut set = world.entities(ComponentFilter::new().with::<Marker>().with::<Position>());
        assert!(set.contains(a));
        assert!(set.added().is_empty());

        let b = world.create_entity();
        world.set_component(b, Marker).unwrap();
        assert!(!set.apply_changes(&world));

        world.set_component(b, Position::default()).unwrap();
        world.set_component(a, Position { x: 5.0, y: 0.0, z: 0.0 }).unwrap();
        assert!(set.apply_changes(&world));
        assert_eq!(set.added(), &[b]);
        assert_eq!(set.changed(), &[a]);

        world.remove_entity(a);
        assert!(set.apply_changes(&world));
        assert_eq!(set.removed(), &[a]);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn released_changes_keep_the_log_bounded() {
        let mut world = World::default();
        let mut set = world.entities(ComponentFilter::new().with::<Marker>());

        for _ in 0..1000 {
            let e = world.create_entity();
            world.set_component(e, Marker).unwrap();
            world.set_component(e, Position::default()).unwrap();
            set.apply_changes(&world);
            world.remove_entity(e);
            set.apply_changes(&world);
            world.release_changes(set.cursor());
        }

        assert_eq!(world.retained_changes(), 0);
        assert_eq!(world.change_log(), 3000..3000);
        assert!(set.is_empty());
    }

    #[test]
    fn view_behind_released_records_rebuilds() {
        let mut world = World::default();
        let a = world.create_entity();
        world.set_component(a, Marker).unwrap();
        let mut set = world.entities(ComponentFilter::new().with::<Marker>());

        let b = world.create_entity();
        world.set_component(b, Marker).unwrap();
        world.remove_entity(a);
        world.release_changes(world.change_log().end);

        assert!(set.apply_changes(&world));
        assert_eq!(set.added(), &[b]);
        assert_eq!(set.removed(), &[a]);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![b]);

        // A view opened after the release starts from the live entities.
        let late = world.entities(ComponentFilter::new().with::<Marker>());
        assert_eq!(late.iter().collect::<Vec<_>>(), vec![b]);
    }
}
