//! Legacy tile-set bitmap decoder.
//!
//! Decodes the indexed-colour Windows bitmap variant used by legacy tile-sets
//! and level files: 1/2/4/8 bpp uncompressed and 8 bpp run-length (RLE8).
//! The same files may carry an eLVL metadata block, detected by two
//! independent heuristics that are kept exactly as the legacy asset pipeline
//! wrote them (see [`DecodedImage::decode`]).
//!
//! Decoding never fails: bad magic or unsupported formats produce an image
//! with `valid() == false`, and reads past the end of the input yield zeros.
//!
//! Reference: <https://learn.microsoft.com/en-us/windows/win32/gdi/bitmap-storage>
//!
//! # Usage
//! ```ignore
//! let image = DecodedImage::decode(&bytes, true);
//! if image.valid() {
//!     let first_tile = image.tile(1)?;
//! }
//! ```

use std::fmt;
use std::io::Read;

use tracing::{debug, warn};

/// Size of the file header.
pub const FILE_HEADER_LEN: usize = 14;
/// Size of the info header.
pub const INFO_HEADER_LEN: usize = 40;

pub const BMP_MAGIC: &[u8; 2] = b"BM";
/// Magic of a stream that holds only eLVL metadata.
pub const ELVL_MAGIC: &[u8; 4] = b"elvl";

/// File size of the stock 304x160 8 bpp tile-set. Any other size may hide an
/// eLVL block behind the bitmap.
pub const STOCK_TILESET_FILE_SIZE: u32 = 49718;
/// Value of the reserved header field (and offset) announcing an eLVL block.
pub const ELVL_RESERVED_MARKER: u16 = 49720;

/// Edge length of one legacy tile, in pixels.
pub const TILE_SIZE: u32 = 16;
/// Tiles per row in a legacy tile-set.
pub const TILESET_COLUMNS: u32 = 19;

/// Largest pixel buffer the decoder will allocate.
const MAX_PIXELS: u64 = 1 << 26;

/// Pixel payload compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Rgb,
    Rle8,
    Rle4,
    Bitfields,
    Other(u32),
}

impl Compression {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Compression::Rgb,
            1 => Compression::Rle8,
            2 => Compression::Rle4,
            3 => Compression::Bitfields,
            other => Compression::Other(other),
        }
    }
}

/// Errors from pixel accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitmapError {
    CropOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
    NoSuchTile(u16),
}

impl fmt::Display for BitmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitmapError::CropOutOfBounds {
                x,
                y,
                width,
                height,
                image_width,
                image_height,
            } => write!(
                f,
                "crop {width}x{height} at ({x}, {y}) exceeds {image_width}x{image_height} image"
            ),
            BitmapError::NoSuchTile(code) => write!(f, "no tile-set cell for tile code {code}"),
        }
    }
}

impl std::error::Error for BitmapError {}

/// Result of decoding a legacy bitmap stream. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedImage {
    valid: bool,
    file_size: u32,
    width: u32,
    height: u32,
    bit_depth: u16,
    compression: Compression,
    palette: Vec<u32>,
    pixels: Vec<u32>,
    metadata_offset: Option<u32>,
}

impl DecodedImage {
    /// Decodes a bitmap from a byte slice.
    ///
    /// With `transparent_black`, pure-black palette entries get zero alpha so
    /// tile-set backgrounds render transparent.
    pub fn decode(bytes: &[u8], transparent_black: bool) -> Self {
        let mut r = ByteReader::new(bytes);
        let mut image = Self::default();

        let file_header: [u8; FILE_HEADER_LEN] = r.read_array();
        if &file_header[..2] != BMP_MAGIC {
            if &file_header[..4] == ELVL_MAGIC {
                debug!("metadata-only stream, no pixel data");
                image.metadata_offset = Some(0);
            }
            return image;
        }

        image.file_size = le_u32(&file_header, 2);
        if image.file_size != STOCK_TILESET_FILE_SIZE
            && le_u16(&file_header, 6) == ELVL_RESERVED_MARKER
        {
            image.metadata_offset = Some(u32::from(ELVL_RESERVED_MARKER));
        }

        let info: [u8; INFO_HEADER_LEN] = r.read_array();
        let width = le_i32(&info, 4);
        let height = le_i32(&info, 8);
        image.bit_depth = le_u16(&info, 14);
        image.compression = Compression::from_raw(le_u32(&info, 16));
        // Colours-used @20 is ignored: indexed images always carry a full palette.

        if width <= 0 || height <= 0 || (width as u64) * (height as u64) > MAX_PIXELS {
            warn!(width, height, "bitmap dimensions out of range");
            return image;
        }
        image.width = width as u32;
        image.height = height as u32;

        if image.bit_depth <= 8 {
            image.palette = (0..1usize << image.bit_depth)
                .map(|_| palette_entry(r.read_array(), transparent_black))
                .collect();
        }

        image.pixels = vec![0; image.width as usize * image.height as usize];
        match (image.compression, image.bit_depth) {
            (Compression::Rgb, 1 | 2 | 4 | 8) => {
                image.read_rgb(&mut r);
                image.valid = true;
            }
            (Compression::Rle8, 8) => {
                image.read_rle8(&mut r);
                image.valid = true;
            }
            (compression, bit_depth) => {
                debug!(?compression, bit_depth, "unsupported bitmap encoding");
            }
        }

        if r.short_read {
            debug!(len = bytes.len(), "bitmap stream ended early; missing bytes read as zero");
        }
        image
    }

    /// Reads a whole stream and decodes it. Read errors end the stream early.
    pub fn read_from<R: Read>(mut reader: R, transparent_black: bool) -> Self {
        let mut bytes = Vec::new();
        if let Err(e) = reader.read_to_end(&mut bytes) {
            warn!(error = %e, read = bytes.len(), "bitmap read failed; decoding what was read");
        }
        Self::decode(&bytes, transparent_black)
    }

    fn read_rgb(&mut self, r: &mut ByteReader<'_>) {
        let bpp = usize::from(self.bit_depth);
        let per_byte = 8 / bpp;
        let mask = ((1u16 << bpp) - 1) as u8;
        let width = self.width as usize;
        let row_bytes = (width * bpp).div_ceil(8).next_multiple_of(4);

        // Rows are stored bottom-up.
        for y in (0..self.height as usize).rev() {
            let row = r.read_vec(row_bytes);
            for x in 0..width {
                let shift = 8 - (x % per_byte + 1) * bpp;
                let index = (row[x / per_byte] >> shift) & mask;
                self.pixels[y * width + x] = self.palette[usize::from(index)];
            }
        }
    }

    fn read_rle8(&mut self, r: &mut ByteReader<'_>) {
        let mut x: i64 = 0;
        let mut y: i64 = i64::from(self.height) - 1;

        while !r.is_exhausted() {
            let count = r.read_u8();
            let value = r.read_u8();

            if count > 0 {
                for _ in 0..count {
                    self.put(x, y, value);
                    x += 1;
                }
                continue;
            }

            match value {
                // End of row.
                0 => {
                    x = 0;
                    y -= 1;
                }
                // End of bitmap.
                1 => break,
                // Delta.
                2 => {
                    x += i64::from(r.read_u8());
                    y -= i64::from(r.read_u8());
                }
                // Absolute run, padded to a 16-bit boundary.
                n => {
                    for _ in 0..n {
                        let index = r.read_u8();
                        self.put(x, y, index);
                        x += 1;
                    }
                    if n % 2 == 1 {
                        r.read_u8();
                    }
                }
            }
        }
    }

    fn put(&mut self, x: i64, y: i64, index: u8) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        self.pixels[y as usize * self.width as usize + x as usize] = self.palette[usize::from(index)];
    }

    /// Whether the stream was a bitmap this decoder fully supports.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Whether the stream carries (or is) an eLVL metadata block.
    pub fn has_embedded_metadata(&self) -> bool {
        self.metadata_offset.is_some()
    }

    /// Offset of the eLVL block: `Some(0)` for a metadata-only stream.
    pub fn metadata_offset(&self) -> Option<u32> {
        self.metadata_offset
    }

    /// File size declared in the header.
    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// ARGB32 palette, empty above 8 bpp.
    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    /// Full image, ARGB32, row-major, top row first.
    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Square of `size` pixels from the top-left corner.
    pub fn crop_square(&self, size: u32) -> Result<Vec<u32>, BitmapError> {
        self.crop_at(0, 0, size, size)
    }

    /// `width` x `height` pixels from the top-left corner.
    pub fn crop(&self, width: u32, height: u32) -> Result<Vec<u32>, BitmapError> {
        self.crop_at(0, 0, width, height)
    }

    /// `width` x `height` pixels starting at `(x, y)`.
    pub fn crop_at(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Vec<u32>, BitmapError> {
        let fits = |start: u32, len: u32, limit: u32| start.checked_add(len).is_some_and(|end| end <= limit);
        if !fits(x, width, self.width) || !fits(y, height, self.height) {
            return Err(BitmapError::CropOutOfBounds {
                x,
                y,
                width,
                height,
                image_width: self.width,
                image_height: self.height,
            });
        }

        let stride = self.width as usize;
        let (x, width) = (x as usize, width as usize);
        let mut out = Vec::with_capacity(width * height as usize);
        for row in y as usize..(y + height) as usize {
            let start = row * stride + x;
            out.extend_from_slice(&self.pixels[start..start + width]);
        }
        Ok(out)
    }

    /// The 16x16 tile-set cell drawn for legacy tile `code` (codes start at 1).
    pub fn tile(&self, code: u16) -> Result<Vec<u32>, BitmapError> {
        if code == 0 {
            return Err(BitmapError::NoSuchTile(code));
        }
        let cell = u32::from(code) - 1;
        let x = (cell % TILESET_COLUMNS) * TILE_SIZE;
        let y = (cell / TILESET_COLUMNS) * TILE_SIZE;
        self.crop_at(x, y, TILE_SIZE, TILE_SIZE)
            .map_err(|_| BitmapError::NoSuchTile(code))
    }
}

fn palette_entry(raw: [u8; 4], transparent_black: bool) -> u32 {
    let color = (u32::from_le_bytes(raw) & 0x00ff_ffff) | 0xff00_0000;
    if transparent_black && color == 0xff00_0000 {
        0
    } else {
        color
    }
}

/// Fail-soft cursor: reads past the end yield zeros.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    short_read: bool,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            short_read: false,
        }
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn fill(&mut self, out: &mut [u8]) {
        let available = self.data.len().saturating_sub(self.pos).min(out.len());
        out[..available].copy_from_slice(&self.data[self.pos..self.pos + available]);
        if available < out.len() {
            self.short_read = true;
        }
        self.pos += available;
    }

    fn read_array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        self.fill(&mut out);
        out
    }

    fn read_vec(&mut self, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        self.fill(&mut out);
        out
    }

    fn read_u8(&mut self) -> u8 {
        let [b] = self.read_array();
        b
    }
}

// Binary reading helpers over fixed-size headers.
fn le_u16(d: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([d[off], d[off + 1]])
}

fn le_u32(d: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([d[off], d[off + 1], d[off + 2], d[off + 3]])
}

fn le_i32(d: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([d[off], d[off + 1], d[off + 2], d[off + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPAQUE: u32 = 0xff00_0000;

    fn bmp(width: i32, height: i32, bpp: u16, compression: u32, palette: &[u32], payload: &[u8]) -> Vec<u8> {
        let palette_len = if bpp <= 8 { 1usize << bpp } else { 0 };
        let data_offset = (FILE_HEADER_LEN + INFO_HEADER_LEN + palette_len * 4) as u32;
        let file_size = data_offset + payload.len() as u32;

        let mut out = Vec::new();
        out.extend_from_slice(BMP_MAGIC);
        out.extend_from_slice(&file_size.to_le_bytes());
        out.extend_from_slice(&[0; 4]);
        out.extend_from_slice(&data_offset.to_le_bytes());

        out.extend_from_slice(&40u32.to_le_bytes());
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&bpp.to_le_bytes());
        out.extend_from_slice(&compression.to_le_bytes());
        out.extend_from_slice(&(palette_len as u32).to_le_bytes());
        out.extend_from_slice(&[0; 16]);

        for i in 0..palette_len {
            let entry = palette.get(i).copied().unwrap_or(0);
            out.extend_from_slice(&entry.to_le_bytes());
        }
        out.extend_from_slice(payload);
        out
    }

    fn grey_palette() -> Vec<u32> {
        (0..256u32).map(|i| (i << 16) | (i << 8) | i).collect()
    }

    #[test]
    fn single_pixel_maps_palette_index() {
        let palette = grey_palette();
        let image = DecodedImage::decode(&bmp(1, 1, 8, 0, &palette, &[42, 0, 0, 0]), false);

        assert!(image.valid());
        assert_eq!((image.width(), image.height()), (1, 1));
        assert_eq!(image.pixels()[0], image.palette()[42]);
        assert_eq!(image.pixels()[0], OPAQUE | 0x2a2a2a);
    }

    #[test]
    fn black_becomes_transparent_only_on_request() {
        let palette = grey_palette();
        let bytes = bmp(1, 1, 8, 0, &palette, &[0, 0, 0, 0]);

        assert_eq!(DecodedImage::decode(&bytes, false).pixels()[0], OPAQUE);
        assert_eq!(DecodedImage::decode(&bytes, true).pixels()[0], 0);
    }

    #[test]
    fn palette_alpha_byte_is_discarded() {
        let bytes = bmp(1, 1, 8, 0, &[0x7f12_3456], &[0, 0, 0, 0]);
        assert_eq!(DecodedImage::decode(&bytes, true).pixels()[0], 0xff12_3456);
    }

    #[test]
    fn uncompressed_rows_are_bottom_up_and_padded() {
        let palette = grey_palette();
        // 3 pixels per row, padded to 4 bytes; bottom row first.
        let payload = [7, 8, 9, 0xee, 1, 2, 3, 0xee];
        let image = DecodedImage::decode(&bmp(3, 2, 8, 0, &palette, &payload), false);

        assert!(image.valid());
        assert_eq!(image.pixels().len(), 6);
        let indices: Vec<u32> = image.pixels().iter().map(|p| p & 0xff).collect();
        assert_eq!(indices, vec![1, 2, 3, 7, 8, 9]);
    }

    #[test]
    fn one_bit_pixels_are_msb_first() {
        let palette = [0x000000, 0xffffff];
        // 10 pixels wide: 2 data bytes + 2 padding per row.
        let payload = [0b1010_0000, 0b0100_0000, 0, 0, 0b1000_0000, 0b1100_0000, 0, 0];
        let image = DecodedImage::decode(&bmp(10, 2, 1, 0, &palette, &payload), false);

        assert!(image.valid());
        assert_eq!((image.width(), image.height()), (10, 2));
        let bits: Vec<u8> = image.pixels().iter().map(|p| u8::from(*p == 0xffff_ffff)).collect();
        assert_eq!(bits, vec![1, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 0, 1, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn four_bit_pixels_are_high_nibble_first() {
        let palette = grey_palette();
        // 5 pixels: 3 data bytes (last low nibble unused) + 1 padding per row.
        let payload = [0x12, 0x34, 0x5f, 0xee, 0xab, 0xcd, 0xef, 0xee];
        let image = DecodedImage::decode(&bmp(5, 2, 4, 0, &palette, &payload), false);

        assert!(image.valid());
        assert_eq!(image.palette().len(), 16);
        let indices: Vec<u32> = image.pixels().iter().map(|p| p & 0xff).collect();
        assert_eq!(indices, vec![10, 11, 12, 13, 14, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn two_bit_pixels_fill_the_row_byte() {
        let palette = grey_palette();
        let payload = [0b0110_1100, 0xee, 0xee, 0xee];
        let image = DecodedImage::decode(&bmp(3, 1, 2, 0, &palette, &payload), false);

        let indices: Vec<u32> = image.pixels().iter().map(|p| p & 0xff).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn rle8_run_then_end_of_bitmap() {
        let palette = grey_palette();
        // A run of four, end of bitmap, then bytes that must not be consumed.
        let payload = [4, 7, 0, 1, 6, 9];
        let image = DecodedImage::decode(&bmp(6, 2, 8, 1, &palette, &payload), false);

        assert!(image.valid());
        let painted = image.palette()[7];
        assert_eq!(&image.pixels()[6..10], &[painted; 4]);
        assert_eq!(&image.pixels()[10..12], &[0, 0]);
        assert!(image.pixels()[..6].iter().all(|p| *p == 0));
    }

    #[test]
    fn rle8_escapes_move_the_cursor() {
        let palette = grey_palette();
        let payload = [
            0, 3, 1, 2, 3, 0, // absolute run of 3 plus pad byte
            0, 0, // end of row
            0, 2, 1, 0, // delta: one right
            1, 5, // one pixel
            0, 1,
        ];
        let image = DecodedImage::decode(&bmp(4, 2, 8, 1, &palette, &payload), false);

        let indices: Vec<u32> = image.pixels().iter().map(|p| if *p == 0 { 0xff } else { p & 0xff }).collect();
        assert_eq!(indices, vec![0xff, 5, 0xff, 0xff, 1, 2, 3, 0xff]);
    }

    #[test]
    fn rle8_stops_when_input_runs_out() {
        let palette = grey_palette();
        let image = DecodedImage::decode(&bmp(4, 4, 8, 1, &palette, &[2, 1]), false);
        assert!(image.valid());
        assert_eq!(image.pixels().iter().filter(|p| **p != 0).count(), 2);
    }

    #[test]
    fn elvl_magic_is_metadata_only() {
        let mut bytes = ELVL_MAGIC.to_vec();
        bytes.extend_from_slice(&[12, 0, 0, 0, 0, 0, 0, 0]);
        let image = DecodedImage::decode(&bytes, false);

        assert!(!image.valid());
        assert!(image.has_embedded_metadata());
        assert_eq!(image.metadata_offset(), Some(0));
        assert!(image.pixels().is_empty());
    }

    #[test]
    fn reserved_marker_flags_metadata_unless_stock_size() {
        let mut bytes = bmp(1, 1, 8, 0, &[], &[0, 0, 0, 0]);
        bytes[6..8].copy_from_slice(&ELVL_RESERVED_MARKER.to_le_bytes());
        let image = DecodedImage::decode(&bytes, false);
        assert_eq!(image.metadata_offset(), Some(49720));
        assert!(image.valid());

        bytes[2..6].copy_from_slice(&STOCK_TILESET_FILE_SIZE.to_le_bytes());
        assert_eq!(DecodedImage::decode(&bytes, false).metadata_offset(), None);
    }

    #[test]
    fn bad_magic_is_invalid_without_metadata() {
        let image = DecodedImage::decode(b"PNG this is not", false);
        assert!(!image.valid());
        assert!(!image.has_embedded_metadata());
    }

    #[test]
    fn truncated_stream_decodes_with_zeros() {
        let bytes = bmp(4, 3, 8, 0, &grey_palette(), &[]);
        let header_only = &bytes[..FILE_HEADER_LEN + INFO_HEADER_LEN];
        let image = DecodedImage::decode(header_only, false);

        assert!(image.valid());
        assert_eq!(image.pixels().len(), 12);
        assert!(image.pixels().iter().all(|p| *p == OPAQUE));
    }

    #[test]
    fn unsupported_encodings_are_invalid() {
        let rle4 = DecodedImage::decode(&bmp(2, 2, 4, 2, &[], &[0; 8]), false);
        assert!(!rle4.valid());
        assert_eq!(rle4.compression(), Compression::Rle4);

        let truecolor = DecodedImage::decode(&bmp(2, 2, 24, 0, &[], &[0; 16]), false);
        assert!(!truecolor.valid());
        assert!(truecolor.palette().is_empty());

        let upside_down = DecodedImage::decode(&bmp(2, -2, 8, 0, &[], &[0; 8]), false);
        assert!(!upside_down.valid());
    }

    #[test]
    fn crops_copy_from_the_top_left_and_check_bounds() {
        let palette = grey_palette();
        let payload = [4, 5, 6, 0, 1, 2, 3, 0];
        let image = DecodedImage::decode(&bmp(3, 2, 8, 0, &palette, &payload), false);

        let square: Vec<u32> = image.crop_square(2).unwrap().iter().map(|p| p & 0xff).collect();
        assert_eq!(square, vec![1, 2, 4, 5]);
        let strip: Vec<u32> = image.crop(3, 1).unwrap().iter().map(|p| p & 0xff).collect();
        assert_eq!(strip, vec![1, 2, 3]);
        assert_eq!(image.crop_square(3).unwrap_err().to_string(), "crop 3x3 at (0, 0) exceeds 3x2 image");
        assert!(image.crop_at(u32::MAX, 0, 2, 1).is_err());
    }

    #[test]
    fn tile_codes_index_the_tileset_grid() {
        let width = (TILESET_COLUMNS * TILE_SIZE) as usize;
        let height = (2 * TILE_SIZE) as usize;
        // Top row of cells uses index 1, bottom row index 2 (rows stored bottom-up).
        let mut payload = Vec::new();
        for row in (0..height).rev() {
            let index = if row < TILE_SIZE as usize { 1 } else { 2 };
            payload.extend(std::iter::repeat(index).take(width));
        }
        let image = DecodedImage::decode(&bmp(width as i32, height as i32, 8, 0, &grey_palette(), &payload), false);

        assert!(image.tile(19).unwrap().iter().all(|p| p & 0xff == 1));
        assert!(image.tile(20).unwrap().iter().all(|p| p & 0xff == 2));
        assert_eq!(image.tile(20).unwrap().len(), 256);
        assert_eq!(image.tile(0), Err(BitmapError::NoSuchTile(0)));
        assert_eq!(image.tile(39), Err(BitmapError::NoSuchTile(39)));
    }
}
