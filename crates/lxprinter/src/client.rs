//! High-level printer client: session setup and paced line streaming.
//!
//! Streaming runs against a crate-private sink trait so the pacing and
//! flow-control discipline can be exercised without real hardware.

use std::time::Duration;

use tokio::time::sleep;

use crate::ble::{BleConnection, DeviceTarget};
use crate::notify::Signals;
use crate::protocol::{
    self, ACK_BLACK_LEVEL, ACK_HANDSHAKE, ACK_START_PRINT_A, ACK_START_PRINT_B, CMD_HANDSHAKE,
    CMD_START_PRINT_A, CMD_START_PRINT_B, PREFIX_PRINT_COMPLETED,
};
use crate::Result;

/// Settle time after the header and footer control frames.
const CONTROL_FRAME_DELAY: Duration = Duration::from_millis(100);

/// Pacing gap between consecutive line writes.
const LINE_DELAY: Duration = Duration::from_millis(40);

/// Back-off when the printer requested a pause.
const PAUSE_DELAY: Duration = Duration::from_millis(590);

/// How long a command may wait for its acknowledgment notification.
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a job may wait for the completion notification after the
/// footer frame; the mechanics need time to feed the whole page out.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the paced stream writes to and reads flow-control state from.
/// Implemented by the live GATT connection and by the test mock.
pub(crate) trait LineSink {
    async fn send(&mut self, frame: &[u8]) -> Result<()>;
    fn pause_required(&self) -> bool;
    fn clear_pause(&self);
}

/// Stream framed lines with the device's timing discipline:
/// header, 100 ms; per line honor pause (590 ms, clear flag), write,
/// 40 ms; footer, 100 ms.
pub(crate) async fn stream_lines<S: LineSink>(sink: &mut S, lines: &[Vec<u8>]) -> Result<()> {
    sink.send(&protocol::page_header(lines.len())).await?;
    sleep(CONTROL_FRAME_DELAY).await;

    for line in lines {
        if sink.pause_required() {
            tracing::debug!("pausing line stream on printer request");
            sleep(PAUSE_DELAY).await;
            sink.clear_pause();
        }
        sink.send(line).await?;
        sleep(LINE_DELAY).await;
    }

    sink.send(&protocol::page_footer(lines.len())).await?;
    sleep(CONTROL_FRAME_DELAY).await;
    Ok(())
}

struct GattSink<'a> {
    conn: &'a BleConnection,
    signals: &'a Signals,
}

impl LineSink for GattSink<'_> {
    async fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.conn.write(frame).await
    }

    fn pause_required(&self) -> bool {
        self.signals.pause_required()
    }

    fn clear_pause(&self) {
        self.signals.clear_pause()
    }
}

/// A connected, initialized LX-D02 printer.
pub struct LxPrinter {
    conn: BleConnection,
    signals: std::sync::Arc<Signals>,
}

impl LxPrinter {
    /// Discover, connect, subscribe, and run the initialization sequence
    /// (handshake, then the black-level parameter).
    pub async fn connect(target: &DeviceTarget, black_level: u8) -> Result<Self> {
        // Validate before any radio work.
        let black_level_cmd = protocol::black_level_command(black_level)?;

        let mut conn = BleConnection::new().await?;
        let peripheral = conn.find_printer(target).await?;
        let signals = Signals::new();
        conn.connect(peripheral, signals.clone()).await?;

        let printer = Self { conn, signals };
        printer.send_command(&CMD_HANDSHAKE, ACK_HANDSHAKE).await?;
        printer
            .send_command(&black_level_cmd, ACK_BLACK_LEVEL)
            .await?;
        tracing::info!(black_level, "printer initialized");
        Ok(printer)
    }

    /// Write a command and wait for the notification carrying its
    /// acknowledgment prefix.
    async fn send_command(&self, cmd: &[u8], expected_prefix: &str) -> Result<()> {
        tracing::debug!(cmd = %hex::encode(cmd), expected_prefix, "sending command");
        self.conn.write(cmd).await?;
        self.signals.wait_for_prefix(expected_prefix, ACK_TIMEOUT).await?;
        Ok(())
    }

    /// Print one page worth of packed lines.
    ///
    /// Runs the per-job start sequence, normalizes sequence numbers,
    /// streams with pacing, and waits for the completion notification.
    pub async fn print_lines(&mut self, lines: Vec<Vec<u8>>) -> Result<()> {
        self.signals.reset_for_job();

        self.send_command(&CMD_START_PRINT_A, ACK_START_PRINT_A).await?;
        self.send_command(&CMD_START_PRINT_B, ACK_START_PRINT_B).await?;

        let lines = protocol::normalize_lines(lines);
        tracing::info!(lines = lines.len(), "streaming page");

        let mut sink = GattSink {
            conn: &self.conn,
            signals: self.signals.as_ref(),
        };
        stream_lines(&mut sink, &lines).await?;

        self.signals
            .wait_for_prefix(PREFIX_PRINT_COMPLETED, COMPLETION_TIMEOUT)
            .await?;
        tracing::info!("print completed");
        Ok(())
    }

    /// Tear the connection down.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.conn.disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::LINE_PAYLOAD_BYTES;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::time::Instant;

    /// Records every frame with its (virtual) timestamp; optionally raises
    /// the pause flag right after a chosen frame is written.
    struct MockSink {
        frames: Vec<(Instant, Vec<u8>)>,
        pause: Arc<AtomicBool>,
        raise_pause_after_frame: Option<usize>,
    }

    impl MockSink {
        fn new() -> Self {
            Self {
                frames: Vec::new(),
                pause: Arc::new(AtomicBool::new(false)),
                raise_pause_after_frame: None,
            }
        }
    }

    impl LineSink for MockSink {
        async fn send(&mut self, frame: &[u8]) -> Result<()> {
            self.frames.push((Instant::now(), frame.to_vec()));
            if self.raise_pause_after_frame == Some(self.frames.len()) {
                self.pause.store(true, Ordering::SeqCst);
            }
            Ok(())
        }

        fn pause_required(&self) -> bool {
            self.pause.load(Ordering::SeqCst)
        }

        fn clear_pause(&self) {
            self.pause.store(false, Ordering::SeqCst);
        }
    }

    fn payload_lines(n: usize) -> Vec<Vec<u8>> {
        (0..n)
            .map(|i| protocol::frame_line(i as u16, &vec![i as u8; LINE_PAYLOAD_BYTES]))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn streams_header_lines_footer_in_order() {
        let lines = payload_lines(5);
        let mut sink = MockSink::new();
        stream_lines(&mut sink, &lines).await.expect("stream");

        assert_eq!(sink.frames.len(), 7);
        assert_eq!(sink.frames[0].1, protocol::page_header(5));
        assert_eq!(sink.frames[6].1, protocol::page_footer(5));
        for (i, line) in lines.iter().enumerate() {
            assert_eq!(&sink.frames[i + 1].1, line);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_line_stream_matches_wire_example() {
        let payload: Vec<u8> = (0..LINE_PAYLOAD_BYTES)
            .map(|i| if i % 2 == 0 { 0xFF } else { 0x00 })
            .collect();
        let lines = protocol::normalize_lines(vec![payload.clone()]);

        let mut sink = MockSink::new();
        stream_lines(&mut sink, &lines).await.expect("stream");

        assert_eq!(sink.frames[0].1, [0x5A, 0x04, 0x00, 0x02, 0x00, 0x00]);
        let mut expected_line = vec![0x55, 0x00, 0x00];
        expected_line.extend_from_slice(&payload);
        expected_line.push(0x00);
        assert_eq!(sink.frames[1].1, expected_line);
        assert_eq!(sink.frames[2].1, [0x5A, 0x04, 0x00, 0x02, 0x01, 0x00]);
    }

    #[tokio::test(start_paused = true)]
    async fn line_pacing_is_forty_millis() {
        let lines = payload_lines(3);
        let mut sink = MockSink::new();
        stream_lines(&mut sink, &lines).await.expect("stream");

        // header -> first line: 100ms settle
        let header_gap = sink.frames[1].0 - sink.frames[0].0;
        assert_eq!(header_gap, Duration::from_millis(100));

        // line -> line: 40ms
        let line_gap = sink.frames[2].0 - sink.frames[1].0;
        assert_eq!(line_gap, Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_delays_next_line_and_clears_flag() {
        let lines = payload_lines(5);
        let mut sink = MockSink::new();
        // Raise pause right after the 2nd line (frame 3: header + 2 lines),
        // so it is honored before line 3 goes out.
        sink.raise_pause_after_frame = Some(3);

        stream_lines(&mut sink, &lines).await.expect("stream");

        let gap = sink.frames[3].0 - sink.frames[2].0;
        assert!(
            gap >= Duration::from_millis(590),
            "expected >=590ms pause before line 3, got {gap:?}"
        );
        assert!(!sink.pause.load(Ordering::SeqCst), "pause flag must be cleared");

        // Later lines resume normal pacing.
        let resumed_gap = sink.frames[4].0 - sink.frames[3].0;
        assert_eq!(resumed_gap, Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn no_write_happens_while_pause_flag_is_set() {
        let lines = payload_lines(4);
        let mut sink = MockSink::new();
        sink.raise_pause_after_frame = Some(2);

        stream_lines(&mut sink, &lines).await.expect("stream");

        // Every frame after the flag was raised must have been written with
        // the flag down again (the streamer clears before writing).
        assert!(!sink.pause.load(Ordering::SeqCst));
        assert_eq!(sink.frames.len(), 6);
    }
}
