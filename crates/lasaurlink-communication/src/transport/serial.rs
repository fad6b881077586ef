//! Serial port transport implementation
//!
//! Wraps the `serialport` crate behind the [`Transport`] trait with a short
//! read timeout so the orchestrator's per-tick read drain never blocks.

use crate::transport::{ConnectionParams, SerialParity, Transport};
use lasaurlink_core::{ConnectionError, Error, Result};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Convert a parity setting to serialport format
fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// Real serial port transport using the serialport crate
pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
}

impl SerialTransport {
    /// Open a serial port with the given parameters.
    ///
    /// The read timeout is kept short so `read` behaves as a non-blocking
    /// poll; writes stay small (one chunk) so the write timeout is never
    /// the limiting factor.
    pub fn open(params: &ConnectionParams) -> Result<Self> {
        let builder = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(params.timeout_ms.max(1)))
            .data_bits(match params.data_bits {
                5 => serialport::DataBits::Five,
                6 => serialport::DataBits::Six,
                7 => serialport::DataBits::Seven,
                8 => serialport::DataBits::Eight,
                other => {
                    return Err(Error::Connection(ConnectionError::InvalidParameters {
                        reason: format!("invalid data bits: {}", other),
                    }))
                }
            })
            .stop_bits(match params.stop_bits {
                1 => serialport::StopBits::One,
                2 => serialport::StopBits::Two,
                other => {
                    return Err(Error::Connection(ConnectionError::InvalidParameters {
                        reason: format!("invalid stop bits: {}", other),
                    }))
                }
            })
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            });

        match builder.open() {
            Ok(port) => {
                tracing::debug!(port = %params.port, baud = params.baud_rate, "serial port opened");
                Ok(SerialTransport {
                    port: Some(port),
                    name: params.port.clone(),
                })
            }
            Err(e) => {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                Err(Error::Connection(ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }))
            }
        }
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port_mut()?.read(buf) {
            Ok(n) => Ok(n),
            // A poll that times out with nothing to read is not an error.
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.port_mut()?.write(data)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut port) = self.port.take() {
            let _ = port.flush();
        }
        Ok(())
    }
}
