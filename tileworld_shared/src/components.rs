//! Components attached to tile-world entities.

use serde::{Deserialize, Serialize};

/// What kind of game object an entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    MapTile,
    CaptureFlag,
    /// Decorative hazard; the payload is its size class (1 = small, 2 = large).
    Asteroid(u8),
    Arena,
}

/// Tile family. Legacy tiles render a cell of the legacy tile-set, wang-blob
/// tiles render the variant picked by their neighbour mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileKind {
    Legacy,
    WangBlob,
}

impl TileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TileKind::Legacy => "legacy",
            TileKind::WangBlob => "wangblob",
        }
    }
}

/// Tile type: which tile-set it comes from and which code it had there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileType {
    pub kind: TileKind,
    /// Source asset (level file name) or tile-set name; empty for live tiles.
    pub tileset: String,
    /// Raw legacy tile code, 0 for wang-blob tiles.
    pub code: u16,
}

impl TileType {
    pub fn legacy(tileset: &str, code: u16) -> Self {
        Self {
            kind: TileKind::Legacy,
            tileset: tileset.to_string(),
            code,
        }
    }

    pub fn wang_blob(tileset: &str) -> Self {
        Self {
            kind: TileKind::WangBlob,
            tileset: tileset.to_string(),
            code: 0,
        }
    }
}

/// Visual variant chosen by the auto-tiler: the 8-neighbour wang-blob mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TileVariant {
    pub mask: u8,
}

/// Collision shape handed to the physics space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BodyShape {
    /// Axis-aligned square with the given edge length.
    Square(f64),
    Circle(f64),
}

/// Simulation time (nanoseconds) at which the entity was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnTime(pub i64);

/// Display name, used for arenas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name(pub String);
