//! Bitmap comparison for the symbol classifier.
//!
//! Both measures work on packed rows eight pixels at a time: `b` is read at
//! a bit offset so it lines up with `a`, and mismatches are the popcount of
//! the XOR. Pixels outside either bitmap are white, so the comparison frame
//! is the union of both bitmaps, not their overlap.

use crate::jbig2sym::BitImage;

/// Maximum absolute shift (in pixels) that [`Comparator::distance`]
/// searches in x and y.
const SEARCH_RADIUS: i32 = 2;

/// Black pixel count and centroid of a bitmap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphStats {
    /// Number of black pixels.
    pub black: usize,
    /// Centroid x (0 for a blank bitmap).
    pub cx: f64,
    /// Centroid y (0 for a blank bitmap).
    pub cy: f64,
}

impl GlyphStats {
    /// Measures `image`.
    pub fn of(image: &BitImage) -> Self {
        let mut black = 0usize;
        let mut sum_x = 0u64;
        let mut sum_y = 0u64;
        for y in 0..image.height {
            for (i, &byte) in image.row(y).iter().enumerate() {
                if byte == 0 {
                    continue;
                }
                for bit in 0..8 {
                    if byte & (0x80 >> bit) != 0 {
                        black += 1;
                        sum_x += (i * 8 + bit) as u64;
                        sum_y += y as u64;
                    }
                }
            }
        }
        if black == 0 {
            return Self {
                black,
                cx: 0.0,
                cy: 0.0,
            };
        }
        Self {
            black,
            cx: sum_x as f64 / black as f64,
            cy: sum_y as f64 / black as f64,
        }
    }
}

/// Eight pixels of `row` starting at pixel `start`, MSB first. Anything
/// before the row or past its last byte is white.
#[inline]
fn byte_at(row: &[u8], start: i32) -> u8 {
    let get = |i: i32| {
        if i < 0 {
            0
        } else {
            row.get(i as usize).copied().unwrap_or(0)
        }
    };
    let index = start.div_euclid(8);
    let shift = start.rem_euclid(8) as u32;
    let hi = get(index);
    if shift == 0 {
        hi
    } else {
        (hi << shift) | (get(index + 1) >> (8 - shift))
    }
}

fn row_or_empty(image: &BitImage, y: i32) -> &[u8] {
    if y < 0 || y as usize >= image.height {
        &[]
    } else {
        image.row(y as usize)
    }
}

/// Counts pixels where `a(x, y) != b(x + dx, y + dy)`, stopping as soon as
/// the count exceeds `limit`.
fn mismatches(a: &BitImage, b: &BitImage, dx: i32, dy: i32, limit: u32) -> u32 {
    let (aw, ah) = (a.width as i32, a.height as i32);
    let (bw, bh) = (b.width as i32, b.height as i32);
    let x_start = 0.min(-dx);
    let x_end = aw.max(bw - dx);
    let y_start = 0.min(-dy);
    let y_end = ah.max(bh - dy);

    let mut err = 0u32;
    for y in y_start..y_end {
        let row_a = row_or_empty(a, y);
        let row_b = row_or_empty(b, y + dy);
        if row_a.is_empty() && row_b.is_empty() {
            continue;
        }
        let mut x = x_start;
        while x < x_end {
            err += (byte_at(row_a, x) ^ byte_at(row_b, x + dx)).count_ones();
            x += 8;
        }
        if err > limit {
            return err;
        }
    }
    err
}

#[derive(Debug, Default, Clone, Copy)]
/// Compares two BitImages.
pub struct Comparator;

impl Comparator {
    /// Match score in `0.0..=1.0` between two bitmaps.
    ///
    /// `b` is moved so that its black-pixel centroid lands on the centroid
    /// of `a` (rounded to whole pixels); the score is then
    /// `1 - mismatches / (black(a) + black(b))`. Two blank bitmaps score 1.
    pub fn score(&self, a: &BitImage, b: &BitImage) -> f32 {
        self.score_with_stats(a, &GlyphStats::of(a), b, &GlyphStats::of(b))
    }

    /// [`score`](Self::score) with precomputed statistics.
    pub fn score_with_stats(
        &self,
        a: &BitImage,
        sa: &GlyphStats,
        b: &BitImage,
        sb: &GlyphStats,
    ) -> f32 {
        let total = sa.black + sb.black;
        if total == 0 {
            return 1.0;
        }
        if sa.black == 0 || sb.black == 0 {
            return 0.0;
        }
        let (dx, dy) = Self::centroid_shift(sa, sb);
        let err = mismatches(a, b, dx, dy, u32::MAX);
        (1.0 - f64::from(err) / total as f64) as f32
    }

    /// Calculates the minimum pixel distance between two BitImages,
    /// considering shifts of `b` within the search radius.
    ///
    /// Returns the minimum error and the `(dx, dy)` shift that gives it, or
    /// `None` if even the best shift has more than `max_err` differing
    /// pixels. Equal errors prefer the shift closest to (0, 0).
    pub fn distance(&self, a: &BitImage, b: &BitImage, max_err: u32) -> Option<(u32, i32, i32)> {
        self.distance_around(a, b, (0, 0), max_err)
    }

    /// [`distance`](Self::distance) with the search centred on `origin`
    /// instead of (0, 0). Equal errors prefer the shift closest to `origin`.
    pub fn distance_around(
        &self,
        a: &BitImage,
        b: &BitImage,
        origin: (i32, i32),
        max_err: u32,
    ) -> Option<(u32, i32, i32)> {
        // Bail early if sizes are wildly different.
        if (a.width as i32 - b.width as i32).abs() > SEARCH_RADIUS * 2
            || (a.height as i32 - b.height as i32).abs() > SEARCH_RADIUS * 2
        {
            return None;
        }

        let (ox, oy) = origin;
        let mut best: Option<(u32, i32, i32)> = None;
        for sy in -SEARCH_RADIUS..=SEARCH_RADIUS {
            for sx in -SEARCH_RADIUS..=SEARCH_RADIUS {
                let limit = best.map_or(max_err, |(e, _, _)| e);
                let err = mismatches(a, b, ox + sx, oy + sy, limit);
                if err > max_err {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((best_err, bdx, bdy)) => {
                        err < best_err
                            || (err == best_err
                                && sx.abs() + sy.abs() < (bdx - ox).abs() + (bdy - oy).abs())
                    }
                };
                if better {
                    best = Some((err, ox + sx, oy + sy));
                }
            }
        }
        best
    }

    /// Shift that lines `b` up with `a` by their rounded black-pixel
    /// centroids: `a(x, y)` corresponds to `b(x + dx, y + dy)`.
    pub fn centroid_shift(sa: &GlyphStats, sb: &GlyphStats) -> (i32, i32) {
        if sa.black == 0 || sb.black == 0 {
            return (0, 0);
        }
        (
            (sb.cx - sa.cx).round() as i32,
            (sb.cy - sa.cy).round() as i32,
        )
    }
}
