//! Status-line decoder
//!
//! Consumes the raw inbound byte stream: extracts the two out-of-band
//! control bytes before line assembly, splits on the line terminator, and
//! parses each line against the firmware's status grammar. A line that
//! does not match the grammar is diagnostic noise and is discarded, never
//! fatal.

use crate::protocol::{FIRMWARE_BANNER, READY_BYTE, REQUEST_READY_BYTE};
use lasaurlink_core::MachineStatus;

/// Longest status line worth keeping; anything longer is firmware noise.
const MAX_LINE_LEN: usize = 1024;

/// One decoded protocol event from the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Readiness pulse: the firmware buffer has room for another chunk.
    ReadyPulse,
    /// Heartbeat echo, used for liveness only.
    Heartbeat,
    /// The firmware's boot banner: a session marker, not payload.
    Banner(String),
    /// A full replacement status record.
    Record(MachineStatus),
    /// A status record carrying the firmware's stop marker; the backlog
    /// must be cancelled.
    Stop(MachineStatus),
}

/// Incremental decoder for the inbound byte stream.
#[derive(Debug, Default)]
pub struct StatusDecoder {
    line_buf: Vec<u8>,
}

impl StatusDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard any partially assembled line.
    pub fn reset(&mut self) {
        self.line_buf.clear();
    }

    /// Feed inbound bytes, returning the events they complete.
    ///
    /// Control bytes are recognized anywhere in the stream, even mid-line,
    /// and are never folded into the line buffer.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        for &b in bytes {
            match b {
                READY_BYTE => events.push(StatusEvent::ReadyPulse),
                REQUEST_READY_BYTE => events.push(StatusEvent::Heartbeat),
                b'\n' | b'\r' => {
                    if !self.line_buf.is_empty() {
                        let line = String::from_utf8_lossy(&self.line_buf).into_owned();
                        self.line_buf.clear();
                        tracing::debug!("RX < {}", line);
                        if let Some(event) = parse_line(&line) {
                            events.push(event);
                        }
                    }
                }
                _ => {
                    if self.line_buf.len() < MAX_LINE_LEN {
                        self.line_buf.push(b);
                    }
                }
            }
        }
        events
    }
}

/// Parse one complete line against the status grammar.
///
/// Returns `None` for diagnostic noise (`#`-prefixed lines), firmware FEC
/// correction notices, and empty lines.
pub fn parse_line(line: &str) -> Option<StatusEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    // Diagnostics are printed by the firmware for humans; ignore.
    if line.chars().take(3).any(|c| c == '#') {
        tracing::debug!("Status: ignored {}", line);
        return None;
    }

    // The firmware echoes a correction notice when its own FEC decoder
    // repaired a chunk. Soft fault only.
    if line.contains('^') {
        tracing::warn!("Status: firmware reported FEC correction");
        return None;
    }

    if line.contains(FIRMWARE_BANNER) {
        return Some(StatusEvent::Banner(line.to_string()));
    }

    let record = parse_record(line);
    if line.contains('!') {
        tracing::info!("Status: stop");
        Some(StatusEvent::Stop(record))
    } else {
        Some(StatusEvent::Record(record))
    }
}

/// Build a fresh status record from single-letter flags and the opaque
/// position/version tail. The record fully replaces the previous one.
fn parse_record(line: &str) -> MachineStatus {
    let mut status = MachineStatus {
        ready: !line.contains('!'),
        bad_number_format_error: line.contains('N'),
        expected_command_letter_error: line.contains('E'),
        unsupported_statement_error: line.contains('U'),
        buffer_overflow: line.contains('B'),
        transmission_error: line.contains('T'),
        power_off: line.contains('P'),
        limit_hit: line.contains('L'),
        serial_stop_request: line.contains('R'),
        door_open: line.contains('D'),
        chiller_off: line.contains('C'),
        ..Default::default()
    };

    // Positions and version ride at the end of the line as X..Y..V..
    let x_pos = line.find('X');
    let y_pos = line.find('Y');
    let v_pos = line.find('V');

    if let (Some(x), Some(y)) = (x_pos, y_pos) {
        if x < y {
            status.x = Some(line[x + 1..y].trim().to_string());
        }
    }
    if let (Some(y), Some(v)) = (y_pos, v_pos) {
        if y < v {
            status.y = Some(line[y + 1..v].trim().to_string());
        }
    }
    if let Some(v) = v_pos {
        let version = line[v + 1..].trim();
        if !version.is_empty() {
            status.firmware_version = Some(version.to_string());
        }
    }

    status
}
