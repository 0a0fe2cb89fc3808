//! Document vs photograph classification.
//!
//! High-contrast pages (mostly very dark and very light pixels) are
//! documents and get threshold binarization; everything else is treated
//! as a photograph and dithered.

use image::GrayImage;
use tracing::debug;

use crate::RasterOptions;

/// What kind of content a page holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    /// Text/line art: sharp threshold, content-box trim applies.
    Document,
    /// Continuous tone: Floyd-Steinberg dithering, no content trim.
    Photograph,
}

/// Classify a grayscale page by its intensity histogram.
///
/// Let D be the pixel count below `dark_threshold` and L the count at or
/// above `light_threshold`; the page is a document iff
/// `(D + L) / total > document_ratio`. An empty page classifies as a
/// photograph.
pub fn classify(gray: &GrayImage, opts: &RasterOptions) -> PageClass {
    let mut bins = [0u64; 256];
    for pixel in gray.pixels() {
        bins[pixel.0[0] as usize] += 1;
    }

    let total: u64 = (gray.width() as u64) * (gray.height() as u64);
    if total == 0 {
        return PageClass::Photograph;
    }

    let dark: u64 = bins[..opts.dark_threshold as usize].iter().sum();
    let light: u64 = bins[opts.light_threshold as usize..].iter().sum();
    let share = (dark + light) as f32 / total as f32;

    let class = if share > opts.document_ratio {
        PageClass::Document
    } else {
        PageClass::Photograph
    };
    debug!(dark, light, total, share, ?class, "classified page");
    class
}
