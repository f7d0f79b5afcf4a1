//! `tileworld_shared`
//!
//! Tile-world core: legacy tile-set decoding, the sparse tile index, wang-blob
//! auto-tiling, live tile edits and throttled legacy map ingestion.
//!
//! Design goals:
//! - Deterministic, tick-driven, single writer.
//! - Entity store and physics are injected through traits.
//! - Decoders never panic on malformed input.
//! - No `unsafe`.

pub mod arena;
pub mod autotile;
pub mod bitmap;
pub mod clock;
pub mod components;
pub mod config;
pub mod console;
pub mod ecs;
pub mod entities;
pub mod event;
pub mod ingest;
pub mod level;
pub mod math;
pub mod physics;
pub mod session;
pub mod system;
pub mod throttle;
pub mod tile;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::clock::SimTime;
    pub use crate::config::*;
    pub use crate::ecs::{EntityId, EntityStore, World};
    pub use crate::event::TileEvent;
    pub use crate::math::*;
    pub use crate::physics::{NullSpace, PhysicsSpace};
    pub use crate::system::{SetupError, TickReport, TileWorld};
    pub use crate::tile::{CoordError, TileCoord, TileIndexView};
}
