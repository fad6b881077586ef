//! Byte transport abstraction
//!
//! The protocol engine is transport-agnostic: it only requires an ordered
//! duplex byte stream within a single connection instance. The serial
//! implementation lives in [`serial`]; tests substitute in-memory mocks.

pub mod serial;

use std::io;

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SerialParity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Parameters for opening a transport connection
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConnectionParams {
    /// Port name (e.g., "/dev/ttyACM0", "COM3")
    pub port: String,
    /// Baud rate (LasaurGrbl speaks 57600)
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity setting
    pub parity: SerialParity,
    /// Hardware flow control. Off by default: readiness is signaled at the
    /// application level because the firmware receive buffer is tiny.
    pub flow_control: bool,
    /// Read timeout in milliseconds for the non-blocking read poll
    pub timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 57_600,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            timeout_ms: 10,
        }
    }
}

impl ConnectionParams {
    /// Create parameters for a named port with defaults otherwise.
    pub fn for_port(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Default::default()
        }
    }
}

/// An ordered duplex byte stream to the firmware.
///
/// Reads and writes are best-effort for this tick: `read` returns 0 when no
/// bytes are available and `write` may accept fewer bytes than offered.
/// Neither blocks beyond the transport's short poll timeout.
pub trait Transport: Send {
    /// Read available bytes into `buf`, returning the count (0 = none yet).
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write bytes to the stream, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Human-readable endpoint name for logging.
    fn name(&self) -> String;

    /// Close the stream. Further reads/writes are errors.
    fn close(&mut self) -> io::Result<()>;
}
