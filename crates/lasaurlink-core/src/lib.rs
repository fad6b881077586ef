//! # LasaurLink Core
//!
//! Core types, traits, and utilities for LasaurLink.
//! Provides the error taxonomy, the machine-status data model, and the
//! listener abstractions shared by the protocol engine and its observers.

pub mod error;
pub mod listener;
pub mod status;

pub use error::{ConnectionError, Error, ProtocolError, Result};
pub use listener::{ProtocolListener, ProtocolListenerHandle};
pub use status::MachineStatus;
