//! Machine status snapshot
//!
//! The firmware emits periodic ASCII status lines; the decoder turns each
//! one into a fresh [`MachineStatus`]. A record is always replaced
//! wholesale, never merged field-by-field, so a snapshot handed to an
//! observer is internally consistent.

use serde::{Deserialize, Serialize};

/// Decoded snapshot of the machine state as last reported by the firmware.
///
/// Flag fields map one-to-one to the single-letter markers in the status
/// line grammar. Position and version fields are carried as opaque strings;
/// this layer stores and forwards telemetry without interpreting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineStatus {
    /// Firmware is idle and has nothing pending
    pub ready: bool,
    /// Host-side pause is active
    pub paused: bool,
    /// Stop: firmware receive buffer overflow (`B`)
    pub buffer_overflow: bool,
    /// Stop: transmission error detected by the firmware (`T`)
    pub transmission_error: bool,
    /// Bad number format in a received command (`N`)
    pub bad_number_format_error: bool,
    /// Expected a command letter (`E`)
    pub expected_command_letter_error: bool,
    /// Unsupported statement (`U`)
    pub unsupported_statement_error: bool,
    /// Stop: laser power supply is off (`P`)
    pub power_off: bool,
    /// Stop: a limit switch was hit (`L`)
    pub limit_hit: bool,
    /// Stop: requested over serial (`R`)
    pub serial_stop_request: bool,
    /// Warning: door open (`D`)
    pub door_open: bool,
    /// Warning: chiller off (`C`)
    pub chiller_off: bool,
    /// Reported X position, opaque text
    pub x: Option<String>,
    /// Reported Y position, opaque text
    pub y: Option<String>,
    /// Firmware version string (`V`)
    pub firmware_version: Option<String>,
    /// Last failure recorded by the orchestrator, if any
    pub last_error: Option<String>,
}

impl Default for MachineStatus {
    fn default() -> Self {
        Self {
            // Turns true once the firmware reports in.
            ready: false,
            paused: false,
            buffer_overflow: false,
            transmission_error: false,
            bad_number_format_error: false,
            expected_command_letter_error: false,
            unsupported_statement_error: false,
            power_off: false,
            limit_hit: false,
            serial_stop_request: false,
            door_open: false,
            chiller_off: false,
            x: None,
            y: None,
            firmware_version: None,
            last_error: None,
        }
    }
}

impl MachineStatus {
    /// True if any stop-class flag is set.
    pub fn is_stopped(&self) -> bool {
        self.buffer_overflow
            || self.transmission_error
            || self.power_off
            || self.limit_hit
            || self.serial_stop_request
    }

    /// True if any error flag is set.
    pub fn has_error(&self) -> bool {
        self.bad_number_format_error
            || self.expected_command_letter_error
            || self.unsupported_statement_error
            || self.last_error.is_some()
    }
}
