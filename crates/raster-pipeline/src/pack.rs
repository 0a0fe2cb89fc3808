//! Bit packing into the device line format.
//!
//! Two adjacent 1-bit rows form one line: per 8-pixel column group an
//! upper-row byte and a lower-row byte, MSB = leftmost pixel, bit set =
//! black. A line carries all upper bytes for the row pair followed by all
//! lower bytes; at device width that is 48 + 48 = 96 bytes.

use image::GrayImage;

use crate::{RasterError, Result};

/// One page packed into device lines, ready for the BLE transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedPage {
    /// Packed row-pair payloads, top to bottom.
    pub lines: Vec<Vec<u8>>,
}

impl PackedPage {
    /// Number of device lines (row pairs).
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// Pack a binarized image (0 = black, 255 = white) into device lines.
///
/// The height must be even; pixels past the last full 8-pixel group of a
/// row stay white.
pub fn pack_lines(bitmap: &GrayImage) -> Result<PackedPage> {
    let (width, height) = bitmap.dimensions();
    if width == 0 || height % 2 != 0 {
        return Err(RasterError::InvalidDimensions { width, height });
    }

    let bytes_per_row = width.div_ceil(8) as usize;
    let mut lines = Vec::with_capacity((height / 2) as usize);

    for y in (0..height).step_by(2) {
        let mut upper = vec![0u8; bytes_per_row];
        let mut lower = vec![0u8; bytes_per_row];

        for x in 0..width {
            let byte = (x / 8) as usize;
            let bit = 7 - (x % 8);
            if bitmap.get_pixel(x, y).0[0] == 0 {
                upper[byte] |= 1 << bit;
            }
            if bitmap.get_pixel(x, y + 1).0[0] == 0 {
                lower[byte] |= 1 << bit;
            }
        }

        let mut line = upper;
        line.extend_from_slice(&lower);
        lines.push(line);
    }

    Ok(PackedPage { lines })
}
