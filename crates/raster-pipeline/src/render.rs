//! Page rendering via ghostscript.
//!
//! The rasterizer is treated as a page-producing oracle: the document
//! lands in a scratch directory, ghostscript renders one PNG per page at
//! the requested resolution, and the PNGs come back decoded.

use std::process::Stdio;

use image::DynamicImage;
use tokio::process::Command;
use tracing::{debug, info};

use crate::{RasterError, Result};

/// Render a PDF or PostScript document into one RGB raster per page.
pub async fn render_document(document: &[u8], dpi: u32) -> Result<Vec<DynamicImage>> {
    let scratch = tempfile::tempdir()?;
    let input_path = scratch.path().join("document");
    tokio::fs::write(&input_path, document).await?;

    let output_pattern = scratch.path().join("page-%04d.png");
    debug!(dpi, bytes = document.len(), "invoking ghostscript");

    let output = Command::new("gs")
        .arg("-dNOPAUSE")
        .arg("-dBATCH")
        .arg("-dSAFER")
        .arg("-dQUIET")
        .arg("-sDEVICE=png16m")
        .arg(format!("-r{dpi}"))
        .arg(format!("-sOutputFile={}", output_pattern.display()))
        .arg(&input_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(RasterError::Renderer {
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    // Collect page-NNNN.png in page order.
    let mut page_paths = Vec::new();
    let mut entries = tokio::fs::read_dir(scratch.path()).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("page-") && name.ends_with(".png") {
            page_paths.push(entry.path());
        }
    }
    page_paths.sort();

    if page_paths.is_empty() {
        return Err(RasterError::NoPages);
    }

    let mut pages = Vec::with_capacity(page_paths.len());
    for path in &page_paths {
        let bytes = tokio::fs::read(path).await?;
        pages.push(image::load_from_memory(&bytes)?);
    }

    info!(pages = pages.len(), dpi, "document rendered");
    Ok(pages)
}
