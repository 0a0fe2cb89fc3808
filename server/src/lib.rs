//! IPP bridge for the LX-D02 BLE thermal printer.
//!
//! Accepts IPP/1.1 print jobs over HTTP, rasterizes them to the device's
//! 1-bit line format, and streams them to the printer over Bluetooth LE.

pub mod bridge;
pub mod config;
pub mod http;
pub mod ipp_service;
