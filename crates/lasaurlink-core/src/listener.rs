//! Listener traits for protocol observers
//!
//! External layers (UI, web frontends) observe the engine through these
//! callbacks rather than by reaching into its state.

use crate::status::MachineStatus;
use async_trait::async_trait;

/// Handle returned when registering a listener, used to unregister it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolListenerHandle(pub String);

/// Callbacks invoked by the serial service as protocol state changes.
///
/// All methods have default no-op implementations so observers only
/// implement what they care about.
#[async_trait]
pub trait ProtocolListener: Send + Sync {
    /// A new status snapshot was published.
    async fn on_status_changed(&self, _status: &MachineStatus) {}

    /// The connection was lost; the reason is terminal for this session.
    async fn on_connection_lost(&self, _reason: &str) {}

    /// The transmission queue drained to empty.
    async fn on_queue_drained(&self) {}
}
