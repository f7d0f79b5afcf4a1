//! Physics abstraction.
//!
//! The tile world only attaches and detaches static collision bodies; the
//! actual simulation lives behind this trait.

use crate::{components::BodyShape, ecs::EntityId, math::Vec3};

/// Physics space handle.
pub trait PhysicsSpace: Send + Sync {
    /// Attaches a static body for `entity` at `at`.
    fn attach(&mut self, entity: EntityId, shape: BodyShape, at: Vec3) -> anyhow::Result<()>;

    /// Detaches the body of `entity`, if any.
    fn detach(&mut self, entity: EntityId);
}

/// No-op physics.
#[derive(Default)]
pub struct NullSpace;

impl PhysicsSpace for NullSpace {
    fn attach(&mut self, _entity: EntityId, _shape: BodyShape, _at: Vec3) -> anyhow::Result<()> {
        Ok(())
    }

    fn detach(&mut self, _entity: EntityId) {}
}
