//! IPP bridge server binary.
//!
//! Exposes the LX-D02 BLE thermal printer as an IPP/1.1 network printer.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ipp_bridge::bridge::{BlePrintExecutor, PrintBridge};
use ipp_bridge::config::AppConfig;
use ipp_bridge::http;
use ipp_bridge::ipp_service::IppService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load();
    tracing::info!(
        printer = %config.printer_name,
        ble_name = %config.ble_name,
        "starting IPP bridge"
    );

    let executor = BlePrintExecutor::new(
        config.ble_address.clone(),
        config.ble_name.clone(),
        config.black_level,
    );
    let bridge = PrintBridge::start(executor);
    let service = Arc::new(IppService::new(config, bridge));

    let server = tokio::spawn(async move {
        if let Err(e) = http::run(service).await {
            tracing::error!(error = %e, "server failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.abort();
    Ok(())
}
