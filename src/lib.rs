//! # LasaurLink
//!
//! A serial protocol engine for Lasersaur laser cutters running the
//! LasaurGrbl firmware, with:
//! - Byte-level flow control over the firmware's tiny receive buffer
//! - Checksummed, optionally redundant command framing (forward error
//!   correction over noisy USB-serial links)
//! - Incremental status report decoding into a typed snapshot
//! - A tokio service wrapping the engine behind channels
//!
//! ## Architecture
//!
//! LasaurLink is organized as a workspace:
//!
//! 1. **lasaurlink-core** - Status model, error taxonomy, listener traits
//! 2. **lasaurlink-communication** - Transport, protocol engine, service
//! 3. **lasaurlink** - Console sender binary integrating the crates

pub use lasaurlink_core::{
    ConnectionError, Error, MachineStatus, ProtocolError, ProtocolListener,
    ProtocolListenerHandle, Result,
};

pub use lasaurlink_communication::{
    ConnectionParams, FailurePolicy, FecMode, FlowState, ManagerConfig, SerialManager,
    SerialParity, SerialService, SerialTransport, ServiceCommand, StallPolicy, Transport,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
