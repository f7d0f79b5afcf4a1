//! Legacy level (`.lvl`) files.
//!
//! A level is an optional tile-set bitmap (or a bare eLVL metadata block)
//! followed by packed tile records. Each record is a little-endian `u32`:
//!
//! ```text
//! bits  0..12  x
//! bits 12..24  y
//! bits 24..32  tile code
//! ```
//!
//! Parsing is lenient in the same way as the bitmap decoder: out-of-range
//! records and a trailing partial record are skipped, never errors.

use std::{fs, path::Path};

use anyhow::Context;
use tracing::{debug, info};

use crate::{
    bitmap::{DecodedImage, BMP_MAGIC, ELVL_MAGIC},
    ingest::TileGrid,
};

/// Edge length of a legacy map, in tiles.
pub const MAP_SIZE: usize = 1024;
/// Size of one tile record.
pub const RECORD_LEN: usize = 4;
/// Smallest possible eLVL header.
pub const ELVL_HEADER_MIN: usize = 12;

/// A parsed level.
#[derive(Debug, Clone)]
pub struct LevelFile {
    name: String,
    tileset: Option<DecodedImage>,
    grid: TileGrid,
    records: usize,
    skipped: usize,
}

impl LevelFile {
    /// Parses level bytes. `name` identifies the level in logs and on the
    /// tiles created from it.
    pub fn parse(name: &str, bytes: &[u8], transparent_black: bool) -> Self {
        let (tileset, records_at) = if bytes.starts_with(BMP_MAGIC) {
            let image = DecodedImage::decode(bytes, transparent_black);
            let at = (image.file_size() as usize).min(bytes.len());
            (Some(image), at)
        } else if bytes.starts_with(ELVL_MAGIC) {
            let declared = bytes
                .get(4..8)
                .map_or(0, |b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize);
            (None, declared.max(ELVL_HEADER_MIN).min(bytes.len()))
        } else {
            (None, 0)
        };

        let mut grid = TileGrid::new(MAP_SIZE, MAP_SIZE);
        let mut records = 0;
        let mut skipped = 0;
        for chunk in bytes[records_at..].chunks_exact(RECORD_LEN) {
            let raw = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            let x = (raw & 0xfff) as usize;
            let y = ((raw >> 12) & 0xfff) as usize;
            let code = (raw >> 24) as u16;
            if grid.set(x, y, code) {
                records += 1;
            } else {
                skipped += 1;
            }
        }

        debug!(
            level = name,
            tileset = tileset.as_ref().is_some_and(DecodedImage::valid),
            records,
            skipped,
            "Level parsed"
        );

        Self {
            name: name.to_string(),
            tileset,
            grid,
            records,
            skipped,
        }
    }

    /// Reads and parses a level file; the level is named after the file stem.
    pub fn load(path: &Path, transparent_black: bool) -> anyhow::Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("read level {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let level = Self::parse(&name, &bytes, transparent_black);
        info!(level = %name, bytes = bytes.len(), records = level.records, "Level loaded");
        Ok(level)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tile-set bitmap embedded in front of the records, if any.
    pub fn tileset(&self) -> Option<&DecodedImage> {
        self.tileset.as_ref()
    }

    /// Offset of the eLVL block announced by the tile-set header.
    pub fn metadata_offset(&self) -> Option<u32> {
        self.tileset.as_ref().and_then(DecodedImage::metadata_offset)
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Records placed on the grid.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Records dropped for lying outside the map.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Packs one tile record.
pub fn encode_record(x: u16, y: u16, code: u8) -> [u8; RECORD_LEN] {
    let raw = (u32::from(x) & 0xfff) | ((u32::from(y) & 0xfff) << 12) | (u32::from(code) << 24);
    raw.to_le_bytes()
}
