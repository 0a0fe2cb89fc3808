//! LX-D02 command protocol.
//!
//! Every command and notification starts with 0x5A. Pixel data travels as
//! framed lines: 0x55, a big-endian sequence number, 96 payload bytes (two
//! 384-pixel rows), and a 0x00 trailer. A `5a04` control frame carrying
//! the line count brackets the stream on both sides.

use uuid::Uuid;

use crate::{LxPrinterError, Result};

/// Write characteristic (commands and pixel lines).
pub const WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x0000_ffe1_0000_1000_8000_00805f9b34fb);

/// Notify characteristic (status and acknowledgment frames).
pub const NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x0000_ffe2_0000_1000_8000_00805f9b34fb);

/// Payload bytes per line: 384 bits x 2 rows / 8.
pub const LINE_PAYLOAD_BYTES: usize = 96;

/// A framed line on the wire: marker + sequence + payload + trailer.
pub const FRAMED_LINE_BYTES: usize = LINE_PAYLOAD_BYTES + 4;

/// Session handshake, acknowledged by [`ACK_HANDSHAKE`].
pub const CMD_HANDSHAKE: [u8; 12] = [0x5A, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];

/// Exact acknowledgment body for the handshake.
pub const ACK_HANDSHAKE: &str = "5a010003c00000001b965a00";

/// Acknowledgment prefix for the black-level parameter.
pub const ACK_BLACK_LEVEL: &str = "5a0c";

/// First start-of-print command, acknowledged with prefix `5a0a`.
pub const CMD_START_PRINT_A: [u8; 12] = [
    0x5A, 0x0A, 0x2E, 0x58, 0xF6, 0x18, 0x1B, 0x79, 0xF1, 0x07, 0x5D, 0xC3,
];

/// Acknowledgment prefix for [`CMD_START_PRINT_A`].
pub const ACK_START_PRINT_A: &str = "5a0a";

/// Second start-of-print command, acknowledged with prefix `5a0b`.
pub const CMD_START_PRINT_B: [u8; 12] = [
    0x5A, 0x0B, 0xDE, 0xFB, 0x0C, 0x26, 0xFE, 0x2D, 0x15, 0x9B, 0x82, 0x2C,
];

/// Acknowledgment prefix for [`CMD_START_PRINT_B`].
pub const ACK_START_PRINT_B: &str = "5a0b";

/// Notification prefix announcing the print finished. Matched at nibble
/// granularity, hence the odd length.
pub const PREFIX_PRINT_COMPLETED: &str = "5a060";

/// Build the black-level parameter command (`5a0c` + level nibble).
pub fn black_level_command(level: u8) -> Result<[u8; 3]> {
    if level > 9 {
        return Err(LxPrinterError::InvalidBlackLevel(level));
    }
    Ok([0x5A, 0x0C, level])
}

/// Control frame opening a line stream: `5a04 <count+1:u16be> 0000`.
pub fn page_header(line_count: usize) -> [u8; 6] {
    let total = (line_count + 1) as u16;
    let [hi, lo] = total.to_be_bytes();
    [0x5A, 0x04, hi, lo, 0x00, 0x00]
}

/// Control frame closing a line stream: `5a04 <count+1:u16be> 0100`.
pub fn page_footer(line_count: usize) -> [u8; 6] {
    let total = (line_count + 1) as u16;
    let [hi, lo] = total.to_be_bytes();
    [0x5A, 0x04, hi, lo, 0x01, 0x00]
}

/// Wrap a naked payload with line framing at the given index.
pub fn frame_line(index: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 4);
    frame.push(0x55);
    frame.extend_from_slice(&index.to_be_bytes());
    frame.extend_from_slice(payload);
    frame.push(0x00);
    frame
}

/// Whether a line already carries the 0x55 ... 0x00 framing.
fn is_framed(line: &[u8]) -> bool {
    line.len() >= 4 && line.first() == Some(&0x55) && line.last() == Some(&0x00)
}

/// Force monotonic zero-based sequence numbers onto a line list.
///
/// Lines already framed get their embedded sequence number rewritten when
/// it disagrees with the index; naked payloads are wrapped. The result's
/// sequence numbers are exactly 0..N-1 regardless of upstream framing.
pub fn normalize_lines(lines: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
    lines
        .into_iter()
        .enumerate()
        .map(|(idx, mut line)| {
            let expected = idx as u16;
            if is_framed(&line) {
                let embedded = u16::from_be_bytes([line[1], line[2]]);
                if embedded != expected {
                    tracing::debug!(embedded, expected, "correcting line sequence number");
                    line[1..3].copy_from_slice(&expected.to_be_bytes());
                }
                line
            } else {
                frame_line(expected, &line)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black_level_command_encodes_nibble() {
        assert_eq!(black_level_command(7).unwrap(), [0x5A, 0x0C, 0x07]);
        assert_eq!(black_level_command(0).unwrap(), [0x5A, 0x0C, 0x00]);
        assert!(matches!(
            black_level_command(10),
            Err(LxPrinterError::InvalidBlackLevel(10))
        ));
    }

    #[test]
    fn header_and_footer_carry_count_plus_one() {
        assert_eq!(page_header(1), [0x5A, 0x04, 0x00, 0x02, 0x00, 0x00]);
        assert_eq!(page_footer(1), [0x5A, 0x04, 0x00, 0x02, 0x01, 0x00]);
        assert_eq!(page_header(511), [0x5A, 0x04, 0x02, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn frame_line_layout() {
        let payload = vec![0xFF; LINE_PAYLOAD_BYTES];
        let frame = frame_line(3, &payload);
        assert_eq!(frame.len(), FRAMED_LINE_BYTES);
        assert_eq!(frame[0], 0x55);
        assert_eq!(&frame[1..3], &[0x00, 0x03]);
        assert_eq!(&frame[3..99], payload.as_slice());
        assert_eq!(frame[99], 0x00);
    }

    #[test]
    fn normalize_wraps_naked_payloads() {
        let lines = vec![vec![0xAA; LINE_PAYLOAD_BYTES], vec![0xBB; LINE_PAYLOAD_BYTES]];
        let normalized = normalize_lines(lines);
        for (idx, line) in normalized.iter().enumerate() {
            assert_eq!(line.len(), FRAMED_LINE_BYTES);
            assert_eq!(u16::from_be_bytes([line[1], line[2]]), idx as u16);
        }
    }

    #[test]
    fn normalize_rewrites_disagreeing_sequence_numbers() {
        let mut shuffled: Vec<Vec<u8>> = (0..4u16)
            .map(|i| frame_line(i, &vec![i as u8; LINE_PAYLOAD_BYTES]))
            .collect();
        shuffled.swap(1, 2);

        let normalized = normalize_lines(shuffled);
        let sequence: Vec<u16> = normalized
            .iter()
            .map(|l| u16::from_be_bytes([l[1], l[2]]))
            .collect();
        assert_eq!(sequence, vec![0, 1, 2, 3]);
    }

    #[test]
    fn normalize_keeps_correct_lines_untouched() {
        let original = frame_line(0, &vec![0x11; LINE_PAYLOAD_BYTES]);
        let normalized = normalize_lines(vec![original.clone()]);
        assert_eq!(normalized[0], original);
    }
}
