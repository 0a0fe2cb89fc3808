//! Raster pipeline for thermal printer output.
//!
//! Turns a PDF/PostScript document into packed device lines: render pages
//! via ghostscript, trim, classify document vs photograph, resample to the
//! 384-pixel device width, binarize, and bit-pack row pairs.

use std::path::PathBuf;

pub mod classify;
pub mod dither;
pub mod pack;
pub mod pipeline;
pub mod render;
pub mod trim;

// Re-exports for convenience
pub use classify::PageClass;
pub use pack::PackedPage;
pub use pipeline::{process_document, process_page};

/// Device paper width in pixels (57 mm at 203 DPI).
pub const DEVICE_WIDTH: u32 = 384;

/// Binarization cut: grayscale below this prints black.
pub const BINARIZE_THRESHOLD: u8 = 128;

/// Errors that can occur in the raster pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("render I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ghostscript failed ({status}): {stderr}")]
    Renderer { status: String, stderr: String },

    #[error("document produced no pages")]
    NoPages,

    #[error("image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("invalid page dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Result type alias for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;

/// Tuning parameters for the pipeline.
#[derive(Debug, Clone)]
pub struct RasterOptions {
    /// Content-trim cut: pixels darker than this bound the crop box.
    pub black_threshold: u8,

    /// Resolution the external rasterizer renders pages at.
    pub render_dpi: u32,

    /// Output width in pixels.
    pub target_width: u32,

    /// Classifier: histogram bins below this count as dark.
    pub dark_threshold: u8,

    /// Classifier: histogram bins at or above this count as light.
    pub light_threshold: u8,

    /// Classifier: dark+light share above which a page is a document.
    pub document_ratio: f32,

    /// Where to drop post-processed page images, if anywhere.
    pub debug_dir: Option<PathBuf>,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            black_threshold: 40,
            render_dpi: 300,
            target_width: DEVICE_WIDTH,
            dark_threshold: 50,
            light_threshold: 200,
            document_ratio: 0.85,
            debug_dir: None,
        }
    }
}

impl RasterOptions {
    /// Builder: set the content-trim black threshold.
    pub fn with_black_threshold(mut self, val: u8) -> Self {
        self.black_threshold = val;
        self
    }

    /// Builder: set the render resolution.
    pub fn with_render_dpi(mut self, val: u32) -> Self {
        self.render_dpi = val;
        self
    }

    /// Builder: set the debug image directory.
    pub fn with_debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }
}
