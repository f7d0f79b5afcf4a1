//! Shared fixtures for the integration tests: synthetic bitmaps and level
//! files, and a physics space that records (or refuses) bodies.

use std::collections::HashMap;

use tileworld_shared::{
    bitmap::{BMP_MAGIC, FILE_HEADER_LEN, INFO_HEADER_LEN},
    components::BodyShape,
    ecs::EntityId,
    level::encode_record,
    math::Vec3,
    physics::PhysicsSpace,
};

/// Installs a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Builds a bottom-up bitmap with a full `2^bpp` palette.
pub fn bitmap(width: i32, height: i32, bpp: u16, compression: u32, palette: &[u32], payload: &[u8]) -> Vec<u8> {
    let palette_len = 1usize << bpp;
    let data_offset = (FILE_HEADER_LEN + INFO_HEADER_LEN + palette_len * 4) as u32;
    let file_size = data_offset + payload.len() as u32;

    let mut out = Vec::with_capacity(file_size as usize);
    out.extend_from_slice(BMP_MAGIC);
    out.extend_from_slice(&file_size.to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&data_offset.to_le_bytes());

    out.extend_from_slice(&(INFO_HEADER_LEN as u32).to_le_bytes());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&bpp.to_le_bytes());
    out.extend_from_slice(&compression.to_le_bytes());
    out.extend_from_slice(&(palette_len as u32).to_le_bytes());
    out.extend_from_slice(&[0; 16]);

    for i in 0..palette_len {
        out.extend_from_slice(&palette.get(i).copied().unwrap_or(0).to_le_bytes());
    }
    out.extend_from_slice(payload);
    out
}

/// Palette where entry `i` is grey level `i`.
pub fn grey_palette() -> Vec<u32> {
    (0..256u32).map(|i| (i << 16) | (i << 8) | i).collect()
}

/// Level bytes: a tile-set bitmap (empty for none) followed by `(x, y, code)`
/// records.
pub fn level(tileset: &[u8], records: &[(u16, u16, u8)]) -> Vec<u8> {
    let mut out = tileset.to_vec();
    for &(x, y, code) in records {
        out.extend_from_slice(&encode_record(x, y, code));
    }
    out
}

/// Physics space that remembers attached bodies and refuses bodies at chosen
/// positions.
#[derive(Debug, Default)]
pub struct RecordingSpace {
    pub bodies: HashMap<EntityId, (BodyShape, Vec3)>,
    pub refuse: Vec<Vec3>,
    pub detached: Vec<EntityId>,
}

impl RecordingSpace {
    pub fn refusing(at: impl IntoIterator<Item = Vec3>) -> Self {
        Self {
            refuse: at.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl PhysicsSpace for RecordingSpace {
    fn attach(&mut self, entity: EntityId, shape: BodyShape, at: Vec3) -> anyhow::Result<()> {
        if self.refuse.contains(&at) {
            anyhow::bail!("body refused at ({}, {}, {})", at.x, at.y, at.z);
        }
        self.bodies.insert(entity, (shape, at));
        Ok(())
    }

    fn detach(&mut self, entity: EntityId) {
        if self.bodies.remove(&entity).is_some() {
            self.detached.push(entity);
        }
    }
}
