//! Binarization: plain threshold for documents, Floyd-Steinberg error
//! diffusion for photographs. Output pixels are 0 (black) or 255 (white).

use image::GrayImage;
use tracing::debug;

use crate::BINARIZE_THRESHOLD;

/// Threshold-only conversion: below `threshold` prints black.
pub fn binarize_threshold(img: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    debug!(width, height, threshold, "threshold binarization");

    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels() {
        let val = if pixel.0[0] >= threshold { 255 } else { 0 };
        out.put_pixel(x, y, image::Luma([val]));
    }
    out
}

/// Floyd-Steinberg dithering.
///
/// Error distribution: right 7/16, below-left 3/16, below 5/16,
/// below-right 1/16.
pub fn floyd_steinberg(img: &GrayImage) -> GrayImage {
    let (width, height) = img.dimensions();
    debug!(width, height, "Floyd-Steinberg dithering");

    let w = width as usize;
    let mut buffer: Vec<i16> = img.pixels().map(|p| i16::from(p.0[0])).collect();

    for y in 0..height as usize {
        for x in 0..w {
            let idx = y * w + x;
            let old = buffer[idx];
            let new = if old >= i16::from(BINARIZE_THRESHOLD) { 255 } else { 0 };
            let error = old - new;
            buffer[idx] = new;

            if x + 1 < w {
                buffer[idx + 1] += error * 7 / 16;
            }
            if y + 1 < height as usize {
                if x > 0 {
                    buffer[idx + w - 1] += error * 3 / 16;
                }
                buffer[idx + w] += error * 5 / 16;
                if x + 1 < w {
                    buffer[idx + w + 1] += error / 16;
                }
            }
        }
    }

    let mut out = GrayImage::new(width, height);
    for (i, val) in buffer.into_iter().enumerate() {
        let x = (i % w) as u32;
        let y = (i / w) as u32;
        out.put_pixel(x, y, image::Luma([val.clamp(0, 255) as u8]));
    }
    out
}
