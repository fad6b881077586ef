//! Error handling for LasaurLink
//!
//! Provides error types for the two layers of the engine:
//! - Protocol errors (framing, checksums, flow control)
//! - Connection errors (transport/serial port)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Protocol error type
///
/// Represents failures in the wire protocol itself: frame corruption,
/// flow-control stalls, and payload limits.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    /// The firmware reported a transmission error for a sent chunk
    #[error("Transmission error reported by firmware")]
    TransmissionError,

    /// No readiness pulse arrived within the configured wait
    #[error("Flow stall: no readiness pulse within {timeout_ms}ms")]
    FlowStall {
        /// The readiness-wait timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Payload exceeds the maximum frame payload size
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// The offending payload size.
        size: usize,
        /// The maximum allowed payload size.
        max: usize,
    },

    /// Payload contains the frame terminator and cannot be framed
    #[error("Payload contains the line terminator")]
    PayloadContainsTerminator,

    /// Generic protocol error
    #[error("Protocol error: {message}")]
    Other {
        /// The error message.
        message: String,
    },
}

/// Connection error type
///
/// Represents errors on the byte transport below the protocol layer.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// No transport is connected
    #[error("Not connected")]
    NotConnected,

    /// A transport is already connected
    #[error("Already connected")]
    AlreadyConnected,

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Connection lost mid-session
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Serial port error
    #[error("Serial port error: {reason}")]
    SerialError {
        /// The reason for the serial port error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Main error type for LasaurLink
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a flow stall
    pub fn is_stall(&self) -> bool {
        matches!(self, Error::Protocol(ProtocolError::FlowStall { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Io(_))
    }

    /// Check if this error is terminal for the current connection
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            Error::Connection(ConnectionError::ConnectionLost { .. })
        )
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
