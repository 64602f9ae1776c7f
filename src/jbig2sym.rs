//! This module defines the core data structures for JBIG2 symbols and bitmaps,
//! and provides utilities for their manipulation, such as sorting for
//! dictionary encoding and reading/writing PBM rasters.

use bitvec::order::Msb0;
use bitvec::prelude::*;
use ndarray::Array2;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::jbig2shared::{u32_to_usize, usize_to_u32};
use crate::{Jbig2Error, Result};

// ==============================================
// Bitmap image handling
// ==============================================

/// A bilevel bitmap, 1 bit per pixel, MSB-first, rows padded to a byte
/// boundary. A set bit is a black pixel.
///
/// Padding bits past `width` are always 0, so two bitmaps with the same
/// pixels have the same packed bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitImage {
    /// Width of the bitmap in pixels
    pub width: usize,
    /// Height of the bitmap in pixels
    pub height: usize,
    stride: usize,
    bits: BitVec<u8, Msb0>,
}

impl BitImage {
    /// Largest accepted width or height.
    pub const MAX_DIMENSION: usize = 1 << 24;
    /// Smallest accepted width or height.
    pub const MIN_DIMENSION: usize = 1;

    fn check_dimensions(width: u32, height: u32) -> Result<()> {
        let range = Self::MIN_DIMENSION..=Self::MAX_DIMENSION;
        if !range.contains(&u32_to_usize(width)) || !range.contains(&u32_to_usize(height)) {
            return Err(Jbig2Error::InvalidBitmap(format!(
                "{}x{} is outside 1..={} in either dimension",
                width,
                height,
                Self::MAX_DIMENSION
            )));
        }
        Ok(())
    }

    /// Creates a new all-white bitmap.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Self::check_dimensions(width, height)?;
        let width = u32_to_usize(width);
        let height = u32_to_usize(height);
        let stride = (width + 7) / 8;
        Ok(Self {
            width,
            height,
            stride,
            bits: BitVec::repeat(false, stride * 8 * height),
        })
    }

    /// Creates a bitmap whose pixel (x, y) is `f(x, y)`.
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize) -> bool,
    {
        let mut image = Self::new(width, height)?;
        for y in 0..image.height {
            for x in 0..image.width {
                if f(x, y) {
                    image.set_usize(x, y, true);
                }
            }
        }
        Ok(image)
    }

    /// Creates a bitmap from packed rows (`ceil(width / 8)` bytes per row,
    /// MSB-first). Bits past the row width are cleared.
    pub fn from_packed(width: u32, height: u32, data: &[u8]) -> Result<Self> {
        Self::check_dimensions(width, height)?;
        let stride = (u32_to_usize(width) + 7) / 8;
        let expected = stride * u32_to_usize(height);
        if data.len() != expected {
            return Err(Jbig2Error::BufferSizeMismatch {
                expected,
                actual: data.len(),
                width,
                height,
            });
        }

        let mut bytes = data.to_vec();
        let tail = width % 8;
        if tail != 0 {
            let mask = 0xFFu8 << (8 - tail);
            for row in bytes.chunks_exact_mut(stride) {
                if let Some(last) = row.last_mut() {
                    *last &= mask;
                }
            }
        }

        Ok(Self {
            width: u32_to_usize(width),
            height: u32_to_usize(height),
            stride,
            bits: BitVec::from_vec(bytes),
        })
    }

    /// Bytes per row.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Gets a pixel value at (x, y). Outside the bitmap reads as white.
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.get_usize(u32_to_usize(x), u32_to_usize(y))
    }

    /// Gets a pixel value with usize coordinates.
    #[inline]
    pub fn get_usize(&self, x: usize, y: usize) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.bits[y * self.stride * 8 + x]
    }

    /// Gets a pixel with signed coordinates, as the context templates
    /// address neighbours. Anything outside the bitmap is 0.
    #[inline]
    pub fn pixel(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 {
            return false;
        }
        self.get_usize(x as usize, y as usize)
    }

    /// Sets a pixel value at (x, y). Writes outside the bitmap are ignored.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.set_usize(u32_to_usize(x), u32_to_usize(y), value);
    }

    /// Sets a pixel value with usize coordinates.
    #[inline]
    pub fn set_usize(&mut self, x: usize, y: usize, value: bool) {
        if x < self.width && y < self.height {
            let idx = y * self.stride * 8 + x;
            self.bits.set(idx, value);
        }
    }

    /// The packed bytes of row `y`.
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * self.stride;
        &self.bits.as_raw_slice()[start..start + self.stride]
    }

    /// All packed rows, back to back.
    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }

    /// Copies the pixels inside `rect` into a new bitmap.
    pub fn crop(&self, rect: &Rect) -> Result<Self> {
        if u32_to_usize(rect.x) + u32_to_usize(rect.width) > self.width
            || u32_to_usize(rect.y) + u32_to_usize(rect.height) > self.height
        {
            return Err(Jbig2Error::InvalidBitmap(format!(
                "crop {:?} exceeds {}x{} bitmap",
                rect, self.width, self.height
            )));
        }
        let mut cropped = Self::new(rect.width, rect.height)?;
        for dy in 0..cropped.height {
            for dx in 0..cropped.width {
                if self.get_usize(u32_to_usize(rect.x) + dx, u32_to_usize(rect.y) + dy) {
                    cropped.set_usize(dx, dy, true);
                }
            }
        }
        Ok(cropped)
    }

    /// Stamps every black pixel of `other` onto this bitmap with its top-left
    /// corner at (x, y) (OR combination). Pixels falling outside are dropped.
    pub fn or_at(&mut self, other: &BitImage, x: usize, y: usize) {
        for sy in 0..other.height {
            for sx in 0..other.width {
                if other.get_usize(sx, sy) {
                    self.set_usize(x + sx, y + sy, true);
                }
            }
        }
    }

    /// Returns the bounding box of the black pixels, or `None` for an
    /// all-white bitmap.
    pub fn bounding_box(&self) -> Option<Rect> {
        if self.bits.not_any() {
            return None;
        }

        let row_has_pixels = |y: usize| self.row(y).iter().any(|&b| b != 0);
        let min_y = (0..self.height).find(|&y| row_has_pixels(y))?;
        let max_y = (0..self.height).rev().find(|&y| row_has_pixels(y))?;

        let mut min_x = self.width;
        let mut max_x = 0;
        for y in min_y..=max_y {
            for x in 0..self.width {
                if self.get_usize(x, y) {
                    min_x = min_x.min(x);
                    max_x = max_x.max(x);
                }
            }
        }

        Some(Rect {
            x: usize_to_u32(min_x),
            y: usize_to_u32(min_y),
            width: usize_to_u32(max_x - min_x + 1),
            height: usize_to_u32(max_y - min_y + 1),
        })
    }

    /// Counts black pixels.
    pub fn count_ones(&self) -> usize {
        self.bits.count_ones()
    }

    /// True if there is no black pixel at all.
    pub fn is_blank(&self) -> bool {
        self.bits.not_any()
    }

    /// Serialises the bitmap as a raw (P4) PBM file.
    pub fn to_pbm(&self) -> Vec<u8> {
        let mut out = format!("P4\n{} {}\n", self.width, self.height).into_bytes();
        out.extend_from_slice(self.as_bytes());
        out
    }
}

impl lutz::Image for BitImage {
    fn width(&self) -> u32 {
        usize_to_u32(self.width)
    }

    fn height(&self) -> u32 {
        usize_to_u32(self.height)
    }

    fn has_pixel(&self, x: u32, y: u32) -> bool {
        self.get(x, y)
    }
}

// ==============================================
// Rectangle and component structures
// ==============================================

/// A rectangle defining a region in the bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A connected component cut out of a page: its own pixels only, plus the
/// page position of its top-left corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedComponent {
    /// Component pixels, tight bounding box.
    pub image: BitImage,
    /// Left edge in page coordinates.
    pub x: u32,
    /// Top edge in page coordinates.
    pub y: u32,
}

impl ConnectedComponent {
    /// Wraps a cut-out bitmap located at (x, y) on the page.
    pub fn new(image: BitImage, x: u32, y: u32) -> Self {
        Self { image, x, y }
    }

    /// Page rectangle covered by the component.
    pub fn rect(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: usize_to_u32(self.image.width),
            height: usize_to_u32(self.image.height),
        }
    }
}

// ==============================================
// Symbol processing and sorting
// ==============================================

/// Groups symbols by height, and sorts symbols within each height class by
/// width, returning indices into `symbols`. Height classes come out in
/// ascending height; equal sizes keep their input order.
pub fn sort_symbols_for_dictionary(symbols: &[&BitImage]) -> Vec<Vec<usize>> {
    let mut height_classes: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, symbol) in symbols.iter().enumerate() {
        height_classes.entry(symbol.height).or_default().push(index);
    }

    // BTreeMap keys (heights) are already sorted.
    height_classes
        .into_values()
        .map(|mut group| {
            group.sort_by_key(|&i| symbols[i].width);
            group
        })
        .collect()
}

/// Computes a hash for a `BitImage` using xxh3. The dimensions seed the hash
/// so that equal bytes at different widths do not collide.
pub fn compute_glyph_hash(image: &BitImage) -> u64 {
    let seed = ((image.width as u64) << 32) | image.height as u64;
    xxh3_64_with_seed(image.as_bytes(), seed)
}

/// Converts an `ndarray::Array2<u8>` (rows × columns, nonzero = black) to a
/// `BitImage`.
pub fn array_to_bitimage(array: &Array2<u8>) -> Result<BitImage> {
    let (height, width) = array.dim();
    let mut bit_image = BitImage::new(usize_to_u32(width), usize_to_u32(height))?;

    for (y, row) in array.rows().into_iter().enumerate() {
        for (x, &pixel) in row.iter().enumerate() {
            if pixel > 0 {
                bit_image.set_usize(x, y, true);
            }
        }
    }

    Ok(bit_image)
}

// ==============================================
// PBM input
// ==============================================

struct PbmHeader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PbmHeader<'a> {
    fn skip_space_and_comments(&mut self) {
        while let Some(&b) = self.data.get(self.pos) {
            if b == b'#' {
                while let Some(&c) = self.data.get(self.pos) {
                    self.pos += 1;
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                }
            } else if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn number(&mut self, what: &str) -> Result<u32> {
        self.skip_space_and_comments();
        let start = self.pos;
        while self.data.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| Jbig2Error::Pbm(format!("missing or invalid {}", what)))
    }
}

/// Parses a PBM image, raw (`P4`) or plain (`P1`).
pub fn parse_pbm(data: &[u8]) -> Result<BitImage> {
    let magic = data.get(..2).unwrap_or_default();
    let raw = match magic {
        b"P4" => true,
        b"P1" => false,
        _ => return Err(Jbig2Error::Pbm("not a PBM file (expected P1 or P4)".into())),
    };

    let mut header = PbmHeader { data, pos: 2 };
    let width = header.number("width")?;
    let height = header.number("height")?;
    BitImage::check_dimensions(width, height)?;

    if raw {
        // Exactly one whitespace byte separates the header from the raster.
        let start = header.pos + 1;
        let stride = (u32_to_usize(width) + 7) / 8;
        let end = start + stride * u32_to_usize(height);
        let raster = data.get(start..end).ok_or_else(|| {
            Jbig2Error::Pbm(format!(
                "raster truncated: need {} bytes, have {}",
                end - start,
                data.len().saturating_sub(start)
            ))
        })?;
        return BitImage::from_packed(width, height, raster);
    }

    // Every plain pixel takes at least one byte.
    let available = data.len().saturating_sub(header.pos) as u64;
    let needed = u64::from(width) * u64::from(height);
    if available < needed {
        return Err(Jbig2Error::Pbm(format!(
            "plain raster truncated: need {} pixels, have {} bytes",
            needed, available
        )));
    }

    let mut image = BitImage::new(width, height)?;
    let total = image.width * image.height;
    let mut filled = 0;
    while filled < total {
        header.skip_space_and_comments();
        match data.get(header.pos) {
            Some(b'0') => {}
            Some(b'1') => image.set_usize(filled % image.width, filled / image.width, true),
            Some(&other) => {
                return Err(Jbig2Error::Pbm(format!(
                    "unexpected byte 0x{:02x} in plain raster",
                    other
                )))
            }
            None => {
                return Err(Jbig2Error::Pbm(format!(
                    "raster truncated after {} of {} pixels",
                    filled, total
                )))
            }
        }
        header.pos += 1;
        filled += 1;
    }
    Ok(image)
}

/// Loads a PBM file into a BitImage.
pub fn load_pbm(path: &Path) -> Result<BitImage> {
    let data = fs::read(path)?;
    parse_pbm(&data)
}
