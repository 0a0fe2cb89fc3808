//! BLE connection management using btleplug.
//!
//! Provides scanning, connecting, notification subscription, and raw
//! characteristic writes for the LX-D02 thermal printer.

use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::notify::Signals;
use crate::protocol::{NOTIFY_CHAR_UUID, WRITE_CHAR_UUID};
use crate::{LxPrinterError, Result};

/// BLE scan window before giving up on discovery.
const SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// How the target printer is identified during discovery.
#[derive(Debug, Clone)]
pub enum DeviceTarget {
    /// Platform device identifier (address on Linux, UUID on macOS).
    Address(String),
    /// Advertised local name (the printer ships as `LX-D02`).
    Name(String),
}

impl std::fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Address(a) => write!(f, "address {a}"),
            Self::Name(n) => write!(f, "name {n}"),
        }
    }
}

/// Manages a BLE connection to a single LX-D02 printer.
pub struct BleConnection {
    adapter: Adapter,
    peripheral: Option<Peripheral>,
    write_char: Option<Characteristic>,
    notify_task: Option<JoinHandle<()>>,
}

impl BleConnection {
    /// Initialize the platform BLE adapter (first available).
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|e| LxPrinterError::BleConnection(e.to_string()))?;

        let adapters = manager
            .adapters()
            .await
            .map_err(|e| LxPrinterError::BleConnection(e.to_string()))?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or_else(|| LxPrinterError::BleConnection("no BLE adapter found".into()))?;

        Ok(Self {
            adapter,
            peripheral: None,
            write_char: None,
            notify_task: None,
        })
    }

    /// Scan for the target printer and return its peripheral handle.
    ///
    /// Listens for discovery events until the first match or the scan
    /// window elapses. Not finding the device is terminal for the job.
    pub async fn find_printer(&self, target: &DeviceTarget) -> Result<Peripheral> {
        tracing::info!(%target, timeout_secs = SCAN_TIMEOUT.as_secs(), "starting BLE scan");

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| LxPrinterError::BleScan(e.to_string()))?;

        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| LxPrinterError::BleScan(e.to_string()))?;

        let deadline = tokio::time::sleep(SCAN_TIMEOUT);
        tokio::pin!(deadline);

        let mut found = None;
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.next() => {
                    let Some(CentralEvent::DeviceDiscovered(id)) = event else {
                        continue;
                    };
                    let Ok(peripheral) = self.adapter.peripheral(&id).await else {
                        continue;
                    };
                    let Ok(Some(props)) = peripheral.properties().await else {
                        continue;
                    };

                    let name = props.local_name.unwrap_or_default();
                    let matches = match target {
                        DeviceTarget::Address(addr) => {
                            id.to_string().eq_ignore_ascii_case(addr)
                                || props.address.to_string().eq_ignore_ascii_case(addr)
                        }
                        DeviceTarget::Name(wanted) => name == *wanted,
                    };

                    tracing::debug!(name = %name, id = %id, matches, "discovered device");
                    if matches {
                        found = Some(peripheral);
                        break;
                    }
                }
            }
        }

        self.adapter
            .stop_scan()
            .await
            .map_err(|e| LxPrinterError::BleScan(e.to_string()))?;

        found.ok_or_else(|| LxPrinterError::PrinterNotFound(target.to_string()))
    }

    /// Connect to the peripheral, locate both characteristics, and
    /// subscribe to notifications before anything is written.
    ///
    /// Incoming notification payloads are dispatched into `signals` by a
    /// background task that lives until disconnect.
    pub async fn connect(&mut self, peripheral: Peripheral, signals: Arc<Signals>) -> Result<()> {
        tracing::info!(id = %peripheral.id(), "connecting to printer");

        peripheral
            .connect()
            .await
            .map_err(|e| LxPrinterError::BleConnection(e.to_string()))?;

        peripheral
            .discover_services()
            .await
            .map_err(|e| LxPrinterError::BleConnection(e.to_string()))?;

        let chars = peripheral.characteristics();
        let write_char = chars
            .iter()
            .find(|c| c.uuid == WRITE_CHAR_UUID)
            .cloned()
            .ok_or(LxPrinterError::MissingCharacteristic)?;
        let notify_char = chars
            .iter()
            .find(|c| c.uuid == NOTIFY_CHAR_UUID)
            .cloned()
            .ok_or(LxPrinterError::MissingCharacteristic)?;

        peripheral
            .subscribe(&notify_char)
            .await
            .map_err(|e| LxPrinterError::BleConnection(e.to_string()))?;

        let mut stream = peripheral
            .notifications()
            .await
            .map_err(|e| LxPrinterError::BleConnection(e.to_string()))?;
        let task = tokio::spawn(async move {
            while let Some(notification) = stream.next().await {
                if notification.uuid == NOTIFY_CHAR_UUID {
                    signals.record(&notification.value);
                }
            }
            tracing::debug!("notification stream closed");
        });

        self.write_char = Some(write_char);
        self.peripheral = Some(peripheral);
        self.notify_task = Some(task);

        tracing::info!("connected and subscribed to notifications");
        Ok(())
    }

    /// Disconnect and stop the notification task.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(task) = self.notify_task.take() {
            task.abort();
        }
        if let Some(peripheral) = self.peripheral.take() {
            tracing::info!("disconnecting printer");
            peripheral
                .disconnect()
                .await
                .map_err(|e| LxPrinterError::BleConnection(e.to_string()))?;
        }
        self.write_char = None;
        Ok(())
    }

    /// Whether a peripheral is currently connected.
    pub fn is_connected(&self) -> bool {
        self.peripheral.is_some()
    }

    /// Write one frame to the write characteristic.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        let peripheral = self.peripheral.as_ref().ok_or(LxPrinterError::NotConnected)?;
        let write_char = self
            .write_char
            .as_ref()
            .ok_or(LxPrinterError::MissingCharacteristic)?;

        peripheral
            .write(write_char, data, WriteType::WithoutResponse)
            .await
            .map_err(|e| LxPrinterError::BleWrite(e.to_string()))
    }
}
