//! Async serial service
//!
//! Wraps [`SerialManager`] in a tokio task so the rest of the application
//! talks to the protocol engine through channels instead of sharing it.
//! The task owns the manager outright: commands arrive over an mpsc
//! channel, status snapshots go out over a watch channel, and registered
//! listeners are notified on their own spawned tasks so a slow observer
//! never stalls the I/O loop.

use crate::manager::{ManagerConfig, SerialManager};
use crate::protocol::codec::FecMode;
use crate::transport::ConnectionParams;
use lasaurlink_core::{Error, MachineStatus, ProtocolListener, ProtocolListenerHandle, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Commands accepted by the service task.
#[derive(Debug, Clone)]
pub enum ServiceCommand {
    /// Open the given port and start the protocol session.
    Connect(ConnectionParams),
    /// Close the connection.
    Disconnect,
    /// Enqueue a block of G-code.
    QueueGcode(String),
    /// Discard the pending backlog.
    CancelQueue,
    /// Discard the backlog and the in-flight chunk.
    HardStop,
    /// Pause or resume transmission.
    SetPause(bool),
    /// Select the FEC mode for subsequent chunks.
    SetFec(FecMode),
    /// Queue a status query if idle.
    RequestStatus,
}

/// Handle to the protocol engine running on its own tokio task.
pub struct SerialService {
    command_tx: mpsc::Sender<ServiceCommand>,
    shutdown_signal: Arc<RwLock<Option<mpsc::Sender<()>>>>,
    io_task: Arc<RwLock<Option<JoinHandle<()>>>>,
    listeners: Arc<RwLock<HashMap<String, Arc<dyn ProtocolListener>>>>,
    status_rx: watch::Receiver<MachineStatus>,
}

impl SerialService {
    /// Spawn the service task with the given manager configuration.
    pub fn start(config: ManagerConfig) -> Self {
        Self::start_with(SerialManager::new(config))
    }

    /// Spawn the service task around an existing manager, e.g. one with a
    /// test transport already attached.
    pub fn start_with(mut manager: SerialManager) -> Self {
        let (command_tx, mut command_rx) = mpsc::channel::<ServiceCommand>(100);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (status_tx, status_rx) = watch::channel(MachineStatus::default());

        let listeners: Arc<RwLock<HashMap<String, Arc<dyn ProtocolListener>>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let task_listeners = listeners.clone();

        let handle = tokio::spawn(async move {
            // Short sleep to avoid busy looping when the line is quiet.
            let loop_delay = Duration::from_millis(10);
            let mut was_draining = false;

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                // Apply every command queued since the last pass.
                while let Ok(cmd) = command_rx.try_recv() {
                    apply_command(&mut manager, cmd);
                }

                if manager.is_connected() {
                    match manager.send_queue_as_ready() {
                        Ok(()) => {}
                        // A tick error that left the manager disconnected
                        // is terminal for the session, whatever its kind.
                        Err(e) if !manager.is_connected() => {
                            let reason = e.to_string();
                            tracing::error!(%reason, "serial session ended");
                            for listener in task_listeners.read().values().cloned() {
                                let reason = reason.clone();
                                tokio::spawn(async move {
                                    listener.on_connection_lost(&reason).await;
                                });
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "tick failed"),
                    }

                    let status = manager.status();
                    if *status_tx.borrow() != status {
                        let _ = status_tx.send(status.clone());
                        for listener in task_listeners.read().values().cloned() {
                            let status = status.clone();
                            tokio::spawn(async move {
                                listener.on_status_changed(&status).await;
                            });
                        }
                    }

                    let draining = manager.queue_len() > 0;
                    if was_draining && !draining {
                        for listener in task_listeners.read().values().cloned() {
                            tokio::spawn(async move {
                                listener.on_queue_drained().await;
                            });
                        }
                    }
                    was_draining = draining;
                }

                tokio::time::sleep(loop_delay).await;
            }
            tracing::debug!("serial service task exited");
        });

        Self {
            command_tx,
            shutdown_signal: Arc::new(RwLock::new(Some(shutdown_tx))),
            io_task: Arc::new(RwLock::new(Some(handle))),
            listeners,
            status_rx,
        }
    }

    /// Send a command to the service task.
    pub async fn send(&self, command: ServiceCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| Error::other("serial service is not running"))
    }

    /// Open the given port.
    pub async fn connect(&self, params: ConnectionParams) -> Result<()> {
        self.send(ServiceCommand::Connect(params)).await
    }

    /// Close the connection.
    pub async fn disconnect(&self) -> Result<()> {
        self.send(ServiceCommand::Disconnect).await
    }

    /// Enqueue a block of G-code.
    pub async fn queue_gcode(&self, gcode: impl Into<String>) -> Result<()> {
        self.send(ServiceCommand::QueueGcode(gcode.into())).await
    }

    /// Discard the pending backlog.
    pub async fn cancel_queue(&self) -> Result<()> {
        self.send(ServiceCommand::CancelQueue).await
    }

    /// Latest published status snapshot.
    pub fn status(&self) -> MachineStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch channel carrying every published status snapshot.
    pub fn watch_status(&self) -> watch::Receiver<MachineStatus> {
        self.status_rx.clone()
    }

    /// Register a listener; the handle unregisters it.
    pub fn add_listener(&self, listener: Arc<dyn ProtocolListener>) -> ProtocolListenerHandle {
        let id = Uuid::new_v4().to_string();
        self.listeners.write().insert(id.clone(), listener);
        ProtocolListenerHandle(id)
    }

    /// Unregister a listener.
    pub fn remove_listener(&self, handle: &ProtocolListenerHandle) {
        let _ = self.listeners.write().remove(&handle.0);
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Stop the service task. Idempotent.
    pub fn shutdown(&self) {
        if let Some(tx) = self.shutdown_signal.write().take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.io_task.write().take() {
            handle.abort();
        }
    }
}

impl Drop for SerialService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn apply_command(manager: &mut SerialManager, command: ServiceCommand) {
    match command {
        ServiceCommand::Connect(params) => {
            if let Err(e) = manager.connect(&params) {
                tracing::error!(error = %e, port = %params.port, "connect failed");
            }
        }
        ServiceCommand::Disconnect => manager.disconnect(),
        ServiceCommand::QueueGcode(gcode) => manager.queue_gcode(&gcode),
        ServiceCommand::CancelQueue => manager.cancel_queue(),
        ServiceCommand::HardStop => manager.hard_stop(),
        ServiceCommand::SetPause(pause) => {
            manager.set_pause(pause);
        }
        ServiceCommand::SetFec(mode) => manager.set_fec_redundancy(mode),
        ServiceCommand::RequestStatus => manager.request_status(),
    }
}
