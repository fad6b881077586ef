//! # LasaurLink Communication
//!
//! The serial protocol engine for LasaurGrbl laser cutters.
//! Turns a stream of G-code commands into an ordered, flow-controlled,
//! checksummed byte transmission, and decodes the firmware's periodic
//! status reports back into structured state.

pub mod manager;
pub mod protocol;
pub mod service;
pub mod transport;

pub use manager::{FailurePolicy, ManagerConfig, SerialManager, StallPolicy};
pub use protocol::{
    codec::{self, FecMode, Frame, Outcome},
    flow::{FlowController, FlowState},
    queue::TransmissionQueue,
    status::{StatusDecoder, StatusEvent},
    FIRMWARE_BANNER, READY_BYTE, REQUEST_READY_BYTE, RX_CHUNK_SIZE, TX_CHUNK_SIZE,
};
pub use service::{SerialService, ServiceCommand};
pub use transport::{
    serial::SerialTransport, ConnectionParams, SerialParity, Transport,
};
