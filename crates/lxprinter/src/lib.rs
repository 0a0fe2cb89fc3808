//! LX-D02 thermal printer control over Bluetooth Low Energy.
//!
//! Provides BLE discovery and connection management, the LX-D02 command
//! protocol (handshake, black level, paced line streaming), and the
//! notification signal hub that drives flow control.

pub mod ble;
pub mod client;
pub mod notify;
pub mod protocol;

// Re-exports for convenience
pub use ble::{BleConnection, DeviceTarget};
pub use client::LxPrinter;
pub use notify::{Notification, Signals};

/// Print width in pixels (57 mm paper at 203 DPI).
pub const PRINT_WIDTH: u16 = 384;

/// Advertised device name the printer ships with.
pub const DEFAULT_DEVICE_NAME: &str = "LX-D02";

/// Errors that can occur during printer operations.
#[derive(Debug, thiserror::Error)]
pub enum LxPrinterError {
    #[error("printer '{0}' not found during BLE scan")]
    PrinterNotFound(String),

    #[error("missing GATT characteristic on connected device")]
    MissingCharacteristic,

    #[error("BLE connection error: {0}")]
    BleConnection(String),

    #[error("BLE write error: {0}")]
    BleWrite(String),

    #[error("BLE scan error: {0}")]
    BleScan(String),

    #[error("not connected to any device")]
    NotConnected,

    #[error("no acknowledgment with prefix {expected} within {waited_secs}s")]
    AckTimeout { expected: String, waited_secs: u64 },

    #[error("black level {0} out of range (0-9)")]
    InvalidBlackLevel(u8),
}

/// Result type alias for printer operations.
pub type Result<T> = std::result::Result<T, LxPrinterError>;
