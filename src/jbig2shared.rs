//! Utility functions for the JBIG2 encoder

// ==============================================
// Type conversion utilities
// ==============================================

/// Convert from u32 to usize.
#[inline]
pub fn u32_to_usize(x: u32) -> usize {
    x as usize
}

/// Convert from usize to u32, saturating at `u32::MAX`.
///
/// Every dimension that reaches this function has already been checked
/// against [`BitImage::MAX_DIMENSION`](crate::jbig2sym::BitImage::MAX_DIMENSION).
#[inline]
pub fn usize_to_u32(x: usize) -> u32 {
    u32::try_from(x).unwrap_or(u32::MAX)
}

/// Number of bits needed to give every one of `v` values a distinct code,
/// i.e. `ceil(log2(v))`. Returns 0 for `v <= 1`.
pub fn log2up(v: u32) -> u32 {
    if v <= 1 {
        return 0;
    }
    32 - (v - 1).leading_zeros()
}

/// Converts dots per inch to the pixels-per-metre unit of the page
/// information segment (T.88 7.4.8.3).
pub fn dpi_to_ppm(dpi: u32) -> u32 {
    ((dpi as u64 * 10_000 + 127) / 254) as u32
}
