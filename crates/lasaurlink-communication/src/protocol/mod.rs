//! Wire protocol for LasaurGrbl
//!
//! The protocol is half-duplex in its send discipline: the host writes at
//! most one chunk, then waits for the firmware's readiness pulse before
//! writing the next. Two out-of-band control bytes drive the handshake,
//! like half an XON/XOFF scheme with the logic reversed: the host solicits
//! with [`REQUEST_READY_BYTE`], the firmware answers with [`READY_BYTE`]
//! once its receive buffer has room.

pub mod codec;
pub mod flow;
pub mod queue;
pub mod status;

/// Bytes written to the device in one go. Must match the firmware's
/// receive buffer granularity; exceeding it risks buffer overrun.
pub const TX_CHUNK_SIZE: usize = 16;

/// Bytes read from the device in one go.
pub const RX_CHUNK_SIZE: usize = 16;

/// Readiness pulse (ASCII DC2), sent by the firmware when its buffer has
/// room for another chunk.
pub const READY_BYTE: u8 = 0x12;

/// Request-ready probe (ASCII DC4), sent by the host to solicit a
/// readiness pulse after connect or after a stall.
pub const REQUEST_READY_BYTE: u8 = 0x14;

/// Identification string the firmware emits once after reset. Seeing it
/// mid-session means the peer rebooted and has no memory of prior flow
/// state.
pub const FIRMWARE_BANNER: &str = "LasaurGrbl";
