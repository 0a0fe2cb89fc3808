//! Crop-box computation and trimming.
//!
//! Two trims run over a page: a whitespace trim that drops the blank
//! margin the renderer adds around the page, and a tighter content trim
//! on documents that crops to the darkest pixels.

use image::GrayImage;
use tracing::debug;

/// Intensity at or above which a pixel counts as background for the
/// whitespace trim. Leaves anti-aliased glyph edges inside the box.
pub const BACKGROUND_CUTOFF: u8 = 250;

/// Tightest rectangle (x, y, width, height) enclosing pixels with
/// intensity strictly below `cutoff`. `None` when no pixel qualifies.
pub fn bounds_below(gray: &GrayImage, cutoff: u8) -> Option<(u32, u32, u32, u32)> {
    let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
    let (mut max_x, mut max_y) = (0u32, 0u32);
    let mut found = false;

    for (x, y, pixel) in gray.enumerate_pixels() {
        if pixel.0[0] < cutoff {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Crop to the bounding box of pixels below `cutoff`; the image passes
/// through unchanged when nothing qualifies.
pub fn crop_below(gray: &GrayImage, cutoff: u8) -> GrayImage {
    match bounds_below(gray, cutoff) {
        Some((x, y, w, h)) => {
            debug!(x, y, w, h, cutoff, "cropping to content box");
            image::imageops::crop_imm(gray, x, y, w, h).to_image()
        }
        None => gray.clone(),
    }
}
