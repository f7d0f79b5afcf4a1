//! Configuration system.
//!
//! Loads tile-world configuration from JSON strings (file IO left to app).

use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// Root configuration for the tile-world host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    /// Fixed simulation tick rate.
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Directory holding `.lvl` files.
    #[serde(default = "default_maps_dir")]
    pub maps_dir: String,
    /// Level loaded at startup, by name without extension.
    #[serde(default)]
    pub startup_map: Option<String>,
    /// Decode palette index 0 / pure black as fully transparent.
    #[serde(default = "default_transparent_black")]
    pub transparent_black: bool,
    /// World offset applied to every ingested legacy map cell.
    #[serde(default = "default_map_offset")]
    pub map_offset: [f64; 3],
    /// Name given to the arena created at initialisation.
    #[serde(default = "default_arena_name")]
    pub arena_name: String,
}

fn default_tick_hz() -> u32 {
    60
}

fn default_maps_dir() -> String {
    "maps".to_string()
}

fn default_transparent_black() -> bool {
    true
}

fn default_map_offset() -> [f64; 3] {
    [-512.0, 512.0, 0.0]
}

fn default_arena_name() -> String {
    "default".to_string()
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            maps_dir: default_maps_dir(),
            startup_map: None,
            transparent_black: default_transparent_black(),
            map_offset: default_map_offset(),
            arena_name: default_arena_name(),
        }
    }
}

impl WorldConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn map_offset(&self) -> Vec3 {
        Vec3::from(self.map_offset)
    }
}
