//! Generic region coding (T.88 6.2): a bitmap coded pixel by pixel with a
//! context built from already-coded neighbours.

use log::debug;

use crate::jbig2arith::{ContextTable, Jbig2ArithCoder};
use crate::jbig2structs::{resolve_at_pixels, validate_template, GenericRegionConfig};
use crate::jbig2sym::BitImage;
use crate::Result;

/// Number of contexts of generic template `template`.
pub fn context_size(template: u8) -> usize {
    match template {
        0 => 1 << 16,
        1 => 1 << 13,
        _ => 1 << 10,
    }
}

/// Fixed SLTP context of each template (Figures 8 to 11).
fn sltp_context(template: u8) -> usize {
    match template {
        0 => 0x9B25,
        1 => 0x0795,
        2 => 0x00E5,
        _ => 0x0195,
    }
}

/// Context of pixel (x, y), bit for bit as in 6.2.5.3.
#[inline]
fn gather_context(bitmap: &BitImage, x: i32, y: i32, template: u8, at: &[(i8, i8); 4]) -> usize {
    let p = |dx: i32, dy: i32| bitmap.pixel(x + dx, y + dy) as usize;
    let a = |i: usize| p(i32::from(at[i].0), i32::from(at[i].1));

    match template {
        0 => {
            p(-1, 0)
                | p(-2, 0) << 1
                | p(-3, 0) << 2
                | p(-4, 0) << 3
                | a(0) << 4
                | p(2, -1) << 5
                | p(1, -1) << 6
                | p(0, -1) << 7
                | p(-1, -1) << 8
                | p(-2, -1) << 9
                | a(1) << 10
                | a(2) << 11
                | p(1, -2) << 12
                | p(0, -2) << 13
                | p(-1, -2) << 14
                | a(3) << 15
        }
        1 => {
            p(-1, 0)
                | p(-2, 0) << 1
                | p(-3, 0) << 2
                | a(0) << 3
                | p(2, -1) << 4
                | p(1, -1) << 5
                | p(0, -1) << 6
                | p(-1, -1) << 7
                | p(-2, -1) << 8
                | p(2, -2) << 9
                | p(1, -2) << 10
                | p(0, -2) << 11
                | p(-1, -2) << 12
        }
        2 => {
            p(-1, 0)
                | p(-2, 0) << 1
                | a(0) << 2
                | p(1, -1) << 3
                | p(0, -1) << 4
                | p(-1, -1) << 5
                | p(-2, -1) << 6
                | p(1, -2) << 7
                | p(0, -2) << 8
                | p(-1, -2) << 9
        }
        _ => {
            p(-1, 0)
                | p(-2, 0) << 1
                | p(-3, 0) << 2
                | p(-4, 0) << 3
                | a(0) << 4
                | p(1, -1) << 5
                | p(0, -1) << 6
                | p(-1, -1) << 7
                | p(-2, -1) << 8
                | p(-3, -1) << 9
        }
    }
}

/// True if row `y` repeats the row above it (row 0 is compared to white).
fn row_is_typical(bitmap: &BitImage, y: usize) -> bool {
    if y == 0 {
        bitmap.row(0).iter().all(|&b| b == 0)
    } else {
        bitmap.row(y) == bitmap.row(y - 1)
    }
}

/// Codes `bitmap` into `coder` as a generic region with template
/// `template` and AT pixels `at_pixels` (missing ones take their nominal
/// position). `stats` must hold [`context_size`] contexts; it is not reset,
/// so a caller can share it across several bitmaps.
///
/// The coder is not flushed.
pub fn encode_generic_region(
    coder: &mut Jbig2ArithCoder,
    stats: &mut ContextTable,
    bitmap: &BitImage,
    template: u8,
    at_pixels: &[(i8, i8)],
    tpgdon: bool,
) -> Result<()> {
    validate_template(template, at_pixels)?;
    let at = resolve_at_pixels(template, at_pixels);

    let mut ltp = false;
    for y in 0..bitmap.height {
        if tpgdon {
            let typical = row_is_typical(bitmap, y);
            coder.encode_bit(stats, sltp_context(template), typical != ltp);
            ltp = typical;
            if ltp {
                continue;
            }
        }

        let yi = y as i32;
        for x in 0..bitmap.width {
            let xi = x as i32;
            let cx = gather_context(bitmap, xi, yi, template, &at);
            coder.encode_bit(stats, cx, bitmap.pixel(xi, yi));
        }
    }
    Ok(())
}

/// Codes `bitmap` as a complete, flushed generic region data stream with a
/// fresh coder and fresh statistics.
pub fn encode_generic_payload(bitmap: &BitImage, config: &GenericRegionConfig) -> Result<Vec<u8>> {
    let mut coder = Jbig2ArithCoder::new();
    let mut stats = ContextTable::new(context_size(config.template));
    encode_generic_region(
        &mut coder,
        &mut stats,
        bitmap,
        config.template,
        &config.at_pixels,
        config.tpgdon,
    )?;
    let data = coder.finish();
    debug!(
        "generic region {}x{} template {} tpgdon {}: {} bytes",
        bitmap.width,
        bitmap.height,
        config.template,
        config.tpgdon,
        data.len()
    );
    Ok(data)
}
