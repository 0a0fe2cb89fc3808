//! Notification frame parsing and the signal hub.
//!
//! The printer reports everything through the notify characteristic:
//! command acknowledgments, battery status, pause requests, and print
//! completion. Frames are matched on their hex-encoded prefix because the
//! completion marker (`5a060`) sits at nibble granularity.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::{LxPrinterError, Result};

/// A parsed notification frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Session handshake acknowledged.
    InitAck,
    /// Battery/charging status report.
    Status {
        battery_percent: Option<u8>,
        charging: bool,
    },
    /// Printer asks the sender to pause line streaming.
    PauseRequest,
    /// Printer is ready to receive lines.
    ReadyToPrint,
    /// Print finished.
    PrintCompleted,
    /// Black-level parameter acknowledged.
    BlackLevelAck,
    /// Generic acknowledgment for a start-of-print command.
    StartAck,
    /// Anything this driver does not interpret.
    Other(Vec<u8>),
}

/// Classify a raw notification payload.
pub fn parse(data: &[u8]) -> Notification {
    let hex = hex::encode(data);
    if hex.starts_with("5a0714") {
        Notification::PauseRequest
    } else if hex.starts_with("5a0b01") {
        Notification::ReadyToPrint
    } else if hex.starts_with("5a060") {
        Notification::PrintCompleted
    } else if hex.starts_with("5a02") {
        let battery_percent = data
            .get(2)
            .filter(|&&b| b <= 0x64)
            .map(|&b| ((b as u16) * 100 / 0x64) as u8);
        let charging = data.get(4) == Some(&0x01);
        Notification::Status {
            battery_percent,
            charging,
        }
    } else if hex.starts_with("5a01") {
        Notification::InitAck
    } else if hex.starts_with("5a0c") {
        Notification::BlackLevelAck
    } else if hex.starts_with("5a0a") || hex.starts_with("5a0b") {
        Notification::StartAck
    } else {
        Notification::Other(data.to_vec())
    }
}

/// Shared state fed by the notification task and consumed by the job in
/// flight. The latest frame (hex) goes through a watch channel so ack
/// waits are event-driven instead of polled.
pub struct Signals {
    latest: watch::Sender<String>,
    pause_required: AtomicBool,
    ready_to_print: AtomicBool,
    print_completed: AtomicBool,
}

impl Signals {
    pub fn new() -> Arc<Self> {
        let (latest, _) = watch::channel(String::new());
        Arc::new(Self {
            latest,
            pause_required: AtomicBool::new(false),
            ready_to_print: AtomicBool::new(false),
            print_completed: AtomicBool::new(false),
        })
    }

    /// Record one notification: parse, raise flags, publish the hex frame.
    pub fn record(&self, data: &[u8]) -> Notification {
        let parsed = parse(data);
        match &parsed {
            Notification::PauseRequest => {
                tracing::debug!("printer requested pause");
                self.pause_required.store(true, Ordering::SeqCst);
            }
            Notification::ReadyToPrint => {
                self.ready_to_print.store(true, Ordering::SeqCst);
            }
            Notification::PrintCompleted => {
                self.print_completed.store(true, Ordering::SeqCst);
            }
            Notification::Status {
                battery_percent,
                charging,
            } => match battery_percent {
                Some(pct) => tracing::info!(battery = pct, charging, "printer status"),
                None => tracing::warn!(frame = %hex::encode(data), "unreadable battery level"),
            },
            _ => {}
        }
        self.latest.send_replace(hex::encode(data));
        parsed
    }

    /// Whether the printer has asked for a streaming pause.
    pub fn pause_required(&self) -> bool {
        self.pause_required.load(Ordering::SeqCst)
    }

    /// Acknowledge a pause request.
    pub fn clear_pause(&self) {
        self.pause_required.store(false, Ordering::SeqCst);
    }

    /// Whether a ready-to-print frame has been seen.
    pub fn ready_to_print(&self) -> bool {
        self.ready_to_print.load(Ordering::SeqCst)
    }

    /// Whether the current job's completion frame has been seen.
    pub fn print_completed(&self) -> bool {
        self.print_completed.load(Ordering::SeqCst)
    }

    /// Arm for a fresh print: clears completion and ready flags.
    pub fn reset_for_job(&self) {
        self.print_completed.store(false, Ordering::SeqCst);
        self.ready_to_print.store(false, Ordering::SeqCst);
    }

    /// Wait until a notification arrives whose hex encoding starts with
    /// `prefix`, or fail with [`LxPrinterError::AckTimeout`].
    pub async fn wait_for_prefix(&self, prefix: &str, timeout: Duration) -> Result<String> {
        let mut rx = self.latest.subscribe();
        let wait = async {
            loop {
                {
                    let current = rx.borrow_and_update();
                    if current.starts_with(prefix) {
                        return current.clone();
                    }
                }
                if rx.changed().await.is_err() {
                    // Sender dropped: the connection is gone; park until
                    // the outer timeout fires.
                    std::future::pending::<()>().await;
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(frame) => Ok(frame),
            Err(_) => Err(LxPrinterError::AckTimeout {
                expected: prefix.to_string(),
                waited_secs: timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(hex_str: &str) -> Vec<u8> {
        hex::decode(hex_str).expect("valid hex")
    }

    #[test]
    fn parse_classifies_known_prefixes() {
        assert_eq!(parse(&frame("5a0714ab")), Notification::PauseRequest);
        assert_eq!(parse(&frame("5a0b01cd")), Notification::ReadyToPrint);
        assert_eq!(parse(&frame("5a0600c10100000000000000")), Notification::PrintCompleted);
        assert_eq!(parse(&frame("5a010003c00000001b965a00")), Notification::InitAck);
        assert_eq!(parse(&frame("5a0c01")), Notification::BlackLevelAck);
        assert_eq!(parse(&frame("5a0aff")), Notification::StartAck);
    }

    #[test]
    fn parse_status_reads_battery_and_charging() {
        // battery 0x32 = 50%, charging byte set
        let status = parse(&frame("5a0232000001"));
        assert_eq!(
            status,
            Notification::Status {
                battery_percent: Some(50),
                charging: true
            }
        );

        // battery out of range
        let status = parse(&frame("5a02ff000000"));
        assert_eq!(
            status,
            Notification::Status {
                battery_percent: None,
                charging: false
            }
        );
    }

    #[test]
    fn ready_frame_is_not_confused_with_start_ack() {
        // 5a0b01 must classify as ReadyToPrint, plain 5a0b as StartAck.
        assert_eq!(parse(&frame("5a0b01")), Notification::ReadyToPrint);
        assert_eq!(parse(&frame("5a0b00")), Notification::StartAck);
    }

    #[test]
    fn record_tracks_ready_and_completion_until_reset() {
        let signals = Signals::new();
        signals.record(&frame("5a0b01"));
        assert!(signals.ready_to_print());

        signals.record(&frame("5a0600c10100000000000000"));
        assert!(signals.print_completed());

        signals.reset_for_job();
        assert!(!signals.ready_to_print());
        assert!(!signals.print_completed());
    }

    #[test]
    fn record_raises_and_clears_pause_flag() {
        let signals = Signals::new();
        assert!(!signals.pause_required());

        signals.record(&frame("5a071400"));
        assert!(signals.pause_required());

        signals.clear_pause();
        assert!(!signals.pause_required());
    }

    #[tokio::test]
    async fn wait_for_prefix_sees_already_recorded_frame() {
        let signals = Signals::new();
        signals.record(&frame("5a0c07"));

        let got = signals
            .wait_for_prefix("5a0c", Duration::from_millis(10))
            .await
            .expect("ack");
        assert_eq!(got, "5a0c07");
    }

    #[tokio::test]
    async fn wait_for_prefix_wakes_on_later_frame() {
        let signals = Signals::new();
        let waiter = {
            let signals = signals.clone();
            tokio::spawn(async move {
                signals
                    .wait_for_prefix("5a0a", Duration::from_secs(1))
                    .await
            })
        };

        tokio::task::yield_now().await;
        signals.record(&frame("5a02ff")); // unrelated
        signals.record(&frame("5a0a99"));

        let got = waiter.await.expect("join").expect("ack");
        assert_eq!(got, "5a0a99");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_prefix_times_out() {
        let signals = Signals::new();
        let err = signals
            .wait_for_prefix("5a0a", Duration::from_secs(10))
            .await
            .expect_err("should time out");
        assert!(matches!(err, LxPrinterError::AckTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_matches_at_nibble_granularity() {
        let signals = Signals::new();
        // 5a065... does not match the 5a060 prefix.
        signals.record(&frame("5a065000"));
        assert!(
            signals
                .wait_for_prefix("5a060", Duration::from_millis(100))
                .await
                .is_err()
        );

        signals.record(&frame("5a0600c1"));
        assert!(
            signals
                .wait_for_prefix("5a060", Duration::from_millis(100))
                .await
                .is_ok()
        );
    }
}
