//! Level files: tile-set decoding and record parsing end to end.

use tileworld_shared::{
    bitmap::{Compression, DecodedImage, TILESET_COLUMNS, TILE_SIZE},
    ingest::{LARGE_ASTEROID, TURF_FLAG},
    level::LevelFile,
};
use tileworld_tests::{bitmap, grey_palette, level};

/// 19x2 cells of 16x16, every pixel of cell `n` painted with index `n + 1`.
fn tileset() -> Vec<u8> {
    let width = (TILESET_COLUMNS * TILE_SIZE) as usize;
    let height = (2 * TILE_SIZE) as usize;
    let mut payload = Vec::with_capacity(width * height);
    for y in (0..height).rev() {
        for x in 0..width {
            let cell = (y / TILE_SIZE as usize) * TILESET_COLUMNS as usize + x / TILE_SIZE as usize;
            payload.push((cell + 1) as u8);
        }
    }
    bitmap(width as i32, height as i32, 8, 0, &grey_palette(), &payload)
}

#[test]
fn tileset_then_records() {
    let bytes = level(&tileset(), &[(0, 0, 1), (512, 512, TURF_FLAG as u8), (3, 7, 20)]);
    let lvl = LevelFile::parse("arena.lvl", &bytes, true);

    let tiles = lvl.tileset().expect("tile-set present");
    assert!(tiles.valid());
    assert_eq!((tiles.width(), tiles.height()), (304, 32));
    assert_eq!(tiles.compression(), Compression::Rgb);

    // Code 20 is the first cell of the second row: grey level 20.
    let cell = tiles.tile(20).unwrap();
    assert_eq!(cell.len(), 256);
    assert!(cell.iter().all(|p| *p == 0xff14_1414));

    assert_eq!(lvl.records(), 3);
    assert_eq!(lvl.grid().get(512, 512), TURF_FLAG);
    assert_eq!(lvl.grid().get(3, 7), 20);
    assert_eq!(lvl.metadata_offset(), None);
}

#[test]
fn tile_code_beyond_tileset_is_an_error() {
    let image = DecodedImage::decode(&tileset(), false);
    assert!(image.tile(38).is_ok());
    assert!(image.tile(39).is_err());
    assert!(image.tile(0).is_err());
}

#[test]
fn transparent_black_applies_to_tileset() {
    let payload = [0u8, 0, 0, 0];
    let bytes = level(&bitmap(1, 1, 8, 0, &grey_palette(), &payload), &[]);

    let opaque = LevelFile::parse("o.lvl", &bytes, false);
    let clear = LevelFile::parse("c.lvl", &bytes, true);
    assert_eq!(opaque.tileset().unwrap().pixels(), &[0xff00_0000]);
    assert_eq!(clear.tileset().unwrap().pixels(), &[0]);
}

#[test]
fn rle_tileset_is_followed_by_records() {
    // 4x1: run of 4 x index 9, end of bitmap.
    let rle = bitmap(4, 1, 8, 1, &grey_palette(), &[4, 9, 0, 1]);
    let bytes = level(&rle, &[(10, 10, LARGE_ASTEROID as u8)]);

    let lvl = LevelFile::parse("rle.lvl", &bytes, true);
    assert_eq!(lvl.tileset().unwrap().pixels(), &[0xff09_0909; 4]);
    assert_eq!(lvl.grid().get(10, 10), LARGE_ASTEROID);
    assert_eq!(lvl.records(), 1);
}
