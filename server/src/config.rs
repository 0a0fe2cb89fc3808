//! Runtime configuration from environment variables.
//!
//! Loaded once at startup; a `.env` file is honored via dotenvy. Every
//! knob has a default that brings up a working bridge next to a stock
//! LX-D02.

use std::path::PathBuf;

use raster_pipeline::RasterOptions;

/// Default TCP port for the IPP endpoint.
const DEFAULT_PORT: u16 = 6310;

/// Printer identity shown to IPP clients.
const DEFAULT_PRINTER_NAME: &str = "Thermal Printer LX-D2 57mm 203 DPI";

/// Stable UUID advertised in printer-uuid.
const DEFAULT_PRINTER_UUID: &str = "urn:uuid:884d7c0a-f449-45a7-8bbe-095e2943d313";

/// Runtime configuration for the bridge and the BLE worker.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub server_port: u16,
    pub printer_name: String,
    pub printer_uri: String,
    pub printer_uuid: String,
    pub ppd_path: PathBuf,
    pub ble_name: String,
    pub ble_address: Option<String>,
    pub black_level: u8,
    pub debug_images: bool,
    pub raster: RasterOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".into(),
            server_port: DEFAULT_PORT,
            printer_name: DEFAULT_PRINTER_NAME.into(),
            printer_uri: format!("ipp://localhost:{DEFAULT_PORT}/"),
            printer_uuid: DEFAULT_PRINTER_UUID.into(),
            ppd_path: PathBuf::from("server/assets/lx-d02.ppd"),
            ble_name: lxprinter::DEFAULT_DEVICE_NAME.into(),
            ble_address: None,
            black_level: 7,
            debug_images: false,
            raster: RasterOptions::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn load() -> Self {
        let g = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        let bind_addr = g("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".into());
        let server_port = parse_u16(g("SERVER_PORT"), DEFAULT_PORT);

        // The advertised URI defaults to the bind host unless it is the
        // wildcard, which clients cannot dial.
        let uri_host = if bind_addr == "0.0.0.0" {
            "localhost".to_string()
        } else {
            bind_addr.clone()
        };
        let printer_uri =
            g("PRINTER_URI").unwrap_or_else(|| format!("ipp://{uri_host}:{server_port}/"));

        let debug_images = g("DEBUG_IMAGES").is_some_and(|v| v == "true");
        let raster = RasterOptions {
            black_threshold: parse_u8(g("BLACK_THRESHOLD"), 40),
            render_dpi: parse_u32(g("RENDER_DPI"), 300),
            dark_threshold: parse_u8(g("CLASSIFY_DARK_THRESHOLD"), 50),
            light_threshold: parse_u8(g("CLASSIFY_LIGHT_THRESHOLD"), 200),
            document_ratio: parse_f32(g("CLASSIFY_DOCUMENT_RATIO"), 0.85),
            debug_dir: debug_images.then(|| PathBuf::from(".debug_images")),
            ..RasterOptions::default()
        };

        Self {
            bind_addr,
            server_port,
            printer_name: g("PRINTER_NAME").unwrap_or_else(|| DEFAULT_PRINTER_NAME.into()),
            printer_uri,
            printer_uuid: g("PRINTER_UUID").unwrap_or_else(|| DEFAULT_PRINTER_UUID.into()),
            ppd_path: g("PPD_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("server/assets/lx-d02.ppd")),
            ble_name: g("BLE_NAME").unwrap_or_else(|| lxprinter::DEFAULT_DEVICE_NAME.into()),
            ble_address: g("BLE_ADDRESS"),
            black_level: parse_u8(g("BLACK_LEVEL"), 7).min(9),
            debug_images,
            raster,
        }
    }
}

fn parse_u16(value: Option<String>, default: u16) -> u16 {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_u8(value: Option<String>, default: u8) -> u8 {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_u32(value: Option<String>, default: u32) -> u32 {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_f32(value: Option<String>, default: f32) -> f32 {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
