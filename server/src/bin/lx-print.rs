//! Standalone printer tool: print one image file over BLE.
//!
//! Bypasses the IPP frontend entirely; useful for bring-up and for
//! checking a printer without touching the OS print stack.

use std::path::PathBuf;

use anyhow::{Context, anyhow};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lxprinter::{DeviceTarget, LxPrinter};
use raster_pipeline::RasterOptions;

#[derive(Debug, Parser)]
#[command(name = "lx-print", about = "Print an image on an LX-D02 thermal printer")]
struct Args {
    /// Path to the image file to print.
    #[arg(short, long)]
    file: PathBuf,

    /// BLE address of the printer; scans by name when omitted.
    #[arg(short, long)]
    address: Option<String>,

    /// Black level, 0 (lightest) to 9 (darkest).
    #[arg(short, long = "black_level", default_value_t = 7)]
    black_level: u8,

    /// Advertised device name to scan for.
    #[arg(short, long, default_value = lxprinter::DEFAULT_DEVICE_NAME)]
    name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let img = image::open(&args.file)
        .with_context(|| format!("could not open image {}", args.file.display()))?;
    let packed = raster_pipeline::process_page(&img, &RasterOptions::default(), false, 0)?
        .ok_or_else(|| anyhow!("image has no printable content"))?;
    tracing::info!(lines = packed.line_count(), "image prepared");

    let target = match args.address {
        Some(address) => DeviceTarget::Address(address),
        None => DeviceTarget::Name(args.name),
    };

    let mut printer = LxPrinter::connect(&target, args.black_level).await?;
    let result = printer.print_lines(packed.lines).await;
    // Always leave the radio in a clean state, even on failure.
    if let Err(e) = printer.disconnect().await {
        tracing::warn!(error = %e, "disconnect failed");
    }
    result?;

    tracing::info!("done");
    Ok(())
}
