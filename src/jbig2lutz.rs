//! Connected-component extraction for symbol coding. Components are found
//! with the Lutz algorithm (8-connected) and cut out of the page with only
//! their own pixels, so touching bounding boxes never leak pixels between
//! neighbours.

use log::debug;

use crate::jbig2sym::{BitImage, ConnectedComponent, Rect};
use crate::Result;

/// Finds the connected components of `image` with at least `min_size`
/// pixels, ordered top to bottom, then left to right, by their top-left
/// corner.
pub fn find_connected_components(
    image: &BitImage,
    min_size: usize,
) -> Result<Vec<ConnectedComponent>> {
    let blobs: Vec<Vec<lutz::Pixel>> = lutz::lutz::<_, Vec<lutz::Pixel>>(image)
        .into_iter()
        .collect();

    let mut result = Vec::with_capacity(blobs.len());
    for pixels in blobs {
        if pixels.is_empty() || pixels.len() < min_size {
            continue;
        }

        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        for p in &pixels {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let bounds = Rect {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        };

        let mut glyph = BitImage::new(bounds.width, bounds.height)?;
        for p in &pixels {
            glyph.set(p.x - min_x, p.y - min_y, true);
        }
        result.push(ConnectedComponent::new(glyph, min_x, min_y));
    }

    result.sort_by_key(|c| (c.y, c.x));
    debug!(
        "found {} components on {}x{} page (min size {})",
        result.len(),
        image.width,
        image.height,
        min_size
    );
    Ok(result)
}

/// Redraws `components` onto a blank `width` x `height` page.
pub fn compose_components(
    width: u32,
    height: u32,
    components: &[ConnectedComponent],
) -> Result<BitImage> {
    let mut page = BitImage::new(width, height)?;
    for c in components {
        page.or_at(&c.image, c.x as usize, c.y as usize);
    }
    Ok(page)
}
