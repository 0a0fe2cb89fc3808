//! Per-page processing pipeline.
//!
//! Order of operations per page: whitespace trim, classification,
//! content-box trim (documents), Lanczos3 resize to device width,
//! binarization, even-height crop, bit packing.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use tracing::{debug, info, warn};

use crate::classify::{self, PageClass};
use crate::pack::{self, PackedPage};
use crate::{RasterOptions, Result, dither, render, trim};

/// Render a document and run every page through the pipeline.
///
/// Pages of a multi-page document are all treated as documents so the
/// content trim applies uniformly. Unprocessable pages (zero dimensions)
/// are logged and skipped rather than failing the job.
pub async fn process_document(document: &[u8], opts: &RasterOptions) -> Result<Vec<PackedPage>> {
    let pages = render::render_document(document, opts.render_dpi).await?;
    let force_document = pages.len() > 1;

    let mut packed = Vec::with_capacity(pages.len());
    for (index, page) in pages.iter().enumerate() {
        match process_page(page, opts, force_document, index)? {
            Some(page) => packed.push(page),
            None => warn!(page = index, "skipping unprocessable page"),
        }
    }
    Ok(packed)
}

/// Run a single rendered page through the pipeline.
///
/// Returns `Ok(None)` for pages that cannot be processed (zero
/// dimensions); the caller decides whether that fails the job.
pub fn process_page(
    page: &DynamicImage,
    opts: &RasterOptions,
    force_document: bool,
    index: usize,
) -> Result<Option<PackedPage>> {
    let gray = page.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        warn!(page = index, "zero-dimension page");
        return Ok(None);
    }

    // Drop the renderer's blank margin.
    let gray = trim::crop_below(&gray, trim::BACKGROUND_CUTOFF);

    let class = if force_document {
        PageClass::Document
    } else {
        classify::classify(&gray, opts)
    };

    // Documents get the tighter content-box trim.
    let gray = match class {
        PageClass::Document => trim::crop_below(&gray, opts.black_threshold),
        PageClass::Photograph => gray,
    };

    let resized = resize_to_width(&gray, opts.target_width);

    let mono = match class {
        PageClass::Document => dither::binarize_threshold(&resized, crate::BINARIZE_THRESHOLD),
        PageClass::Photograph => dither::floyd_steinberg(&resized),
    };

    let mono = crop_to_even_height(mono);
    if mono.height() == 0 {
        warn!(page = index, "page collapsed to zero rows");
        return Ok(None);
    }
    write_debug_image(&mono, opts, class, index);

    let packed = pack::pack_lines(&mono)?;
    info!(
        page = index,
        ?class,
        lines = packed.line_count(),
        "page processed"
    );
    Ok(Some(packed))
}

/// Lanczos3 resample to the device width.
///
/// The height follows from the aspect ratio via round-half-up integer
/// math; a degenerate page keeps at least one row. Callers guarantee a
/// non-zero source width.
fn resize_to_width(gray: &GrayImage, width: u32) -> GrayImage {
    let (src_w, src_h) = gray.dimensions();
    let height = ((u64::from(src_h) * u64::from(width) + u64::from(src_w) / 2)
        / u64::from(src_w))
        .max(1) as u32;

    if (width, height) == (src_w, src_h) {
        return gray.clone();
    }
    debug!(src_w, src_h, width, height, "resampling page to device width");
    image::imageops::resize(gray, width, height, FilterType::Lanczos3)
}

/// Drop the last row when the height is odd so rows pair up into lines.
fn crop_to_even_height(gray: GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    if height % 2 == 0 {
        return gray;
    }
    debug!(height, "cropping odd bottom row");
    image::imageops::crop_imm(&gray, 0, 0, width, height - 1).to_image()
}

/// Best-effort debug artifact; failures only warn.
fn write_debug_image(mono: &GrayImage, opts: &RasterOptions, class: PageClass, index: usize) {
    let Some(dir) = &opts.debug_dir else {
        return;
    };
    let kind = match class {
        PageClass::Document => "document",
        PageClass::Photograph => "dithered",
    };
    let path = dir.join(format!("page-{index:02}-{kind}.png"));
    if let Err(e) = std::fs::create_dir_all(dir).and_then(|()| {
        mono.save(&path)
            .map_err(|e| std::io::Error::other(e.to_string()))
    }) {
        warn!(error = %e, path = %path.display(), "could not write debug image");
    }
}
