//! `tileworld_server`
//!
//! Headless host for the tile world:
//! - Fixed timestep simulation loop
//! - Owns the entity store and the tile-world system
//! - Loads legacy `.lvl` maps from a maps directory
//! - Operator console on stdin

pub mod server;

pub use server::{ServerState, TileServer};
