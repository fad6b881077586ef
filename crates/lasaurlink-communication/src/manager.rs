//! Serial manager orchestrator
//!
//! Owns the connection handle and drives the protocol on every I/O tick:
//! drains inbound bytes into the status decoder, drains the outbound queue
//! through the FEC codec gated by the flow controller, and republishes the
//! latest status and connection health to observers.
//!
//! Each tick performs exactly one read drain and at most one write, so the
//! work unit stays small enough to run cooperatively alongside the rest of
//! the application. External callers interact only through the public
//! operations here; the queue, flow state, status record, and transport
//! are never shared out.

use crate::protocol::codec::{self, FecMode};
use crate::protocol::flow::{FlowController, FlowState};
use crate::protocol::queue::TransmissionQueue;
use crate::protocol::status::{StatusDecoder, StatusEvent};
use crate::protocol::{REQUEST_READY_BYTE, RX_CHUNK_SIZE, TX_CHUNK_SIZE};
use crate::transport::serial::SerialTransport;
use crate::transport::{ConnectionParams, Transport};
use lasaurlink_core::{ConnectionError, Error, MachineStatus, ProtocolError, Result};
use std::time::{Duration, Instant};

/// Policy for a chunk the firmware flagged as corrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum FailurePolicy {
    /// Drop the chunk and keep streaming.
    #[default]
    BestEffort,
    /// Treat corruption as fatal for the session and force a reconnect.
    Strict,
}

/// Policy for a readiness-wait timeout while a chunk is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum StallPolicy {
    /// Revert to probing and resume the chunk from its first unsent byte.
    #[default]
    RetryProbe,
    /// Surface the stall and drop the connection.
    Abort,
}

/// Configuration for the serial manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// FEC mode applied to the next encoded chunk.
    pub fec_mode: FecMode,
    /// What to do when the firmware reports a transmission error.
    pub failure_policy: FailurePolicy,
    /// What to do when no readiness pulse arrives in time.
    pub stall_policy: StallPolicy,
    /// How long to wait for a readiness pulse after a write.
    pub ready_timeout: Duration,
    /// Minimum spacing between request-ready probes.
    pub probe_interval: Duration,
    /// Keep the pending backlog across a lost connection.
    pub preserve_queue_on_disconnect: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            fec_mode: FecMode::default(),
            failure_policy: FailurePolicy::default(),
            stall_policy: StallPolicy::default(),
            ready_timeout: Duration::from_secs(2),
            probe_interval: Duration::from_secs(2),
            preserve_queue_on_disconnect: false,
        }
    }
}

/// A framed command past the codec boundary, partially written.
#[derive(Debug)]
struct InFlight {
    bytes: Vec<u8>,
    sent: usize,
}

impl InFlight {
    fn remaining(&self) -> &[u8] {
        &self.bytes[self.sent..]
    }

    fn done(&self) -> bool {
        self.sent >= self.bytes.len()
    }
}

/// Manages the serial communication with the firmware.
pub struct SerialManager {
    config: ManagerConfig,
    transport: Option<Box<dyn Transport>>,
    queue: TransmissionQueue,
    flow: FlowController,
    decoder: StatusDecoder,
    status: MachineStatus,
    inflight: Option<InFlight>,
    job_active: bool,
    lines_total: usize,
    lines_sent: usize,
}

impl SerialManager {
    /// Create a disconnected manager.
    pub fn new(config: ManagerConfig) -> Self {
        let flow = FlowController::new(config.ready_timeout, config.probe_interval);
        Self {
            config,
            transport: None,
            queue: TransmissionQueue::new(),
            flow,
            decoder: StatusDecoder::new(),
            status: MachineStatus::default(),
            inflight: None,
            job_active: false,
            lines_total: 0,
            lines_sent: 0,
        }
    }

    /// Open a serial port and attach it.
    pub fn connect(&mut self, params: &ConnectionParams) -> Result<()> {
        let transport = SerialTransport::open(params)?;
        self.connect_with(Box::new(transport))
    }

    /// Attach an already-open transport.
    ///
    /// Resets all protocol state and immediately emits a request-ready
    /// probe: a freshly reset firmware may not pulse unprompted.
    pub fn connect_with(&mut self, transport: Box<dyn Transport>) -> Result<()> {
        if self.transport.is_some() {
            return Err(Error::Connection(ConnectionError::AlreadyConnected));
        }

        self.transport = Some(transport);
        self.decoder.reset();
        self.flow.reset();
        self.inflight = None;
        self.status = MachineStatus::default();

        let now = Instant::now();
        if self.flow.should_probe(now) {
            self.write_raw(&[REQUEST_READY_BYTE])?;
        }
        tracing::info!("connected");
        Ok(())
    }

    /// Close the connection and reset owned state. The backlog is kept or
    /// cleared per `preserve_queue_on_disconnect`.
    pub fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close();
        }
        self.reset_session(None);
        tracing::info!("disconnected");
    }

    /// Whether a transport is attached.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Enqueue a block of G-code for transmission.
    ///
    /// Lines are trimmed; blanks and `%`-comments are skipped. A `!` line
    /// is a stop request: it flushes the backlog and is itself sent ahead
    /// of everything, unframed. A bare `?` queues a status query without
    /// clearing the ready flag.
    pub fn queue_gcode(&mut self, gcode: &str) {
        for line in gcode.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('%') {
                continue;
            }

            if line.starts_with('!') {
                self.cancel_queue();
                self.status = MachineStatus {
                    paused: self.status.paused,
                    ..Default::default()
                };
                self.queue.enqueue("!");
            } else {
                if line != "?" {
                    self.status.ready = false;
                }
                self.queue.enqueue(line);
            }
            self.lines_total += 1;
            self.job_active = true;
        }
        tracing::debug!(pending = self.queue.len(), "queued gcode");
    }

    /// Queue a status query if nothing else is pending; the next report
    /// refreshes the snapshot.
    pub fn request_status(&mut self) {
        if self.queue.is_empty() && self.inflight.is_none() {
            self.queue_gcode("?");
        }
    }

    /// Discard the pending backlog. A soft cancel: a chunk already past
    /// the codec boundary keeps going.
    pub fn cancel_queue(&mut self) {
        self.queue.cancel();
        self.job_active = self.inflight.is_some();
        self.lines_total = 0;
        self.lines_sent = 0;
        tracing::info!("queue cancelled");
    }

    /// Hard stop: soft cancel plus dropping the in-flight chunk.
    pub fn hard_stop(&mut self) {
        self.cancel_queue();
        self.inflight = None;
        self.job_active = false;
    }

    /// Pause or resume transmission. Returns the resulting pause state;
    /// pausing an idle manager is a no-op.
    pub fn set_pause(&mut self, pause: bool) -> bool {
        if self.queue.is_empty() && self.inflight.is_none() {
            return false;
        }
        self.status.paused = pause;
        pause
    }

    /// Whether transmission is paused.
    pub fn is_paused(&self) -> bool {
        self.status.paused
    }

    /// Select the FEC mode for subsequently encoded chunks. Never
    /// retroactive: an in-flight chunk keeps its encoding.
    pub fn set_fec_redundancy(&mut self, mode: FecMode) {
        self.config.fec_mode = mode;
    }

    /// Read-only snapshot of the latest machine status.
    pub fn status(&self) -> MachineStatus {
        self.status.clone()
    }

    /// Current flow-control state.
    pub fn flow_state(&self) -> FlowState {
        self.flow.state()
    }

    /// Pending command count (in-flight chunk not included).
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Rough progress through the current job, in percent.
    pub fn queue_percent_done(&self) -> f32 {
        if self.lines_total == 0 {
            return 0.0;
        }
        100.0 * self.lines_sent as f32 / self.lines_total as f32
    }

    /// Perform one unit of read-then-maybe-write work at the current time.
    pub fn send_queue_as_ready(&mut self) -> Result<()> {
        self.tick(Instant::now())
    }

    /// Deterministic tick with an injected clock.
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        if self.transport.is_none() {
            self.status.ready = false;
            return Err(Error::Connection(ConnectionError::NotConnected));
        }
        if self.status.paused {
            return Ok(());
        }

        self.drain_inbound()?;
        self.check_stall(now)?;
        self.write_one(now)?;
        self.finish_job_if_drained();
        Ok(())
    }

    /// One read drain: pull available bytes through the decoder and apply
    /// every event they complete.
    fn drain_inbound(&mut self) -> Result<()> {
        let mut buf = [0u8; RX_CHUNK_SIZE];
        let events = {
            let Some(transport) = self.transport.as_mut() else {
                return Ok(());
            };
            match transport.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => self.decoder.feed(&buf[..n]),
                Err(e) => {
                    return Err(self.handle_connection_lost(&format!("read failed: {}", e)));
                }
            }
        };

        for event in events {
            match event {
                StatusEvent::ReadyPulse => self.flow.on_ready_pulse(),
                StatusEvent::Heartbeat => tracing::debug!("heartbeat echo"),
                StatusEvent::Banner(banner) => {
                    tracing::info!(%banner, "firmware session start");
                    self.flow.on_banner();
                    // The peer rebooted: whatever was in flight is gone.
                    self.inflight = None;
                    self.status = MachineStatus {
                        paused: self.status.paused,
                        ..Default::default()
                    };
                }
                StatusEvent::Record(record) => self.apply_record(record, false)?,
                StatusEvent::Stop(record) => self.apply_record(record, true)?,
            }
        }
        Ok(())
    }

    /// Replace the status snapshot wholesale and react to what it says.
    fn apply_record(&mut self, mut record: MachineStatus, stop: bool) -> Result<()> {
        record.paused = self.status.paused;
        self.status = record;

        if stop {
            self.cancel_queue();
            self.status.ready = false;
        }

        if self.status.transmission_error {
            match self.config.failure_policy {
                FailurePolicy::BestEffort => {
                    tracing::warn!("firmware reported transmission error; dropping chunk");
                    self.status.last_error = Some("transmission error".to_string());
                    self.inflight = None;
                }
                FailurePolicy::Strict => {
                    self.handle_connection_lost("transmission error (strict policy)");
                    return Err(Error::Protocol(ProtocolError::TransmissionError));
                }
            }
        }
        Ok(())
    }

    fn check_stall(&mut self, now: Instant) -> Result<()> {
        if !self.flow.check_stall(now) {
            return Ok(());
        }

        let timeout_ms = self.flow.ready_timeout().as_millis() as u64;
        tracing::warn!(timeout_ms, "flow stall: no readiness pulse");
        self.status.last_error = Some(format!("flow stall after {}ms", timeout_ms));

        match self.config.stall_policy {
            StallPolicy::RetryProbe => {
                // Stay connected; the probe path below re-solicits a pulse
                // and the in-flight chunk resumes from its next unsent
                // byte (a full re-send could execute a command twice).
                Ok(())
            }
            StallPolicy::Abort => {
                self.disconnect();
                self.status.last_error = Some(format!("flow stall after {}ms", timeout_ms));
                Err(Error::Protocol(ProtocolError::FlowStall { timeout_ms }))
            }
        }
    }

    /// At most one write per tick: a control byte, a framed chunk, or a
    /// request-ready probe.
    fn write_one(&mut self, now: Instant) -> Result<()> {
        // `!` and `~` go out no matter what the flow state says: they are
        // the firmware's own out-of-band stop/resume controls.
        if matches!(self.queue.peek(), Some("!") | Some("~")) {
            if let Some(line) = self.queue.pop() {
                tracing::debug!("TX > CONTROL {}", line);
                let n = self.write_raw(line.as_bytes())?;
                if n == 0 {
                    self.queue.requeue_front(line);
                } else {
                    self.lines_sent += 1;
                }
            }
            return Ok(());
        }

        if self.flow.can_send() {
            if self.inflight.is_none() {
                if let Some(line) = self.queue.pop() {
                    let frames = match codec::encode_chunked(line.as_bytes(), self.config.fec_mode)
                    {
                        Ok(frames) => frames,
                        Err(e) => {
                            self.status.last_error = Some(e.to_string());
                            return Err(e);
                        }
                    };
                    let bytes: Vec<u8> = frames
                        .into_iter()
                        .flat_map(codec::Frame::into_bytes)
                        .collect();
                    tracing::debug!("TX > {}", line);
                    self.inflight = Some(InFlight { bytes, sent: 0 });
                }
            }

            let next_chunk = self.inflight.as_ref().map(|f| {
                let take = f.remaining().len().min(TX_CHUNK_SIZE);
                f.remaining()[..take].to_vec()
            });
            if let Some(chunk) = next_chunk {
                let n = self.write_raw(&chunk)?;
                if n > 0 {
                    self.flow.mark_sent(now);
                    if let Some(inflight) = self.inflight.as_mut() {
                        inflight.sent += n;
                        if inflight.done() {
                            self.inflight = None;
                            self.lines_sent += 1;
                        }
                    }
                }
            }
            return Ok(());
        }

        if self.flow.should_probe(now) {
            tracing::debug!("TX > REQUEST_READY");
            self.write_raw(&[REQUEST_READY_BYTE])?;
        }
        Ok(())
    }

    fn finish_job_if_drained(&mut self) {
        if self.job_active && self.queue.is_empty() && self.inflight.is_none() {
            self.job_active = false;
            self.lines_total = 0;
            self.lines_sent = 0;
            // Ready again once the stream is fully handed over.
            self.status.ready = true;
            tracing::info!("gcode stream finished");
        }
    }

    /// Write through the transport, mapping failures to a lost connection.
    fn write_raw(&mut self, data: &[u8]) -> Result<usize> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::Connection(ConnectionError::NotConnected));
        };
        match transport.write(data) {
            Ok(n) => Ok(n),
            Err(e) => Err(self.handle_connection_lost(&format!("write failed: {}", e))),
        }
    }

    /// Terminal for the current connection: drop the transport, reset all
    /// owned state, and record the reason where observers can see it.
    fn handle_connection_lost(&mut self, reason: &str) -> Error {
        tracing::error!(%reason, "connection lost");
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close();
        }
        self.reset_session(Some(reason));
        Error::Connection(ConnectionError::ConnectionLost {
            reason: reason.to_string(),
        })
    }

    fn reset_session(&mut self, error: Option<&str>) {
        self.flow.reset();
        self.decoder.reset();
        self.inflight = None;
        if !self.config.preserve_queue_on_disconnect {
            self.queue.cancel();
            self.job_active = false;
            self.lines_total = 0;
            self.lines_sent = 0;
        }
        self.status = MachineStatus {
            last_error: error.map(str::to_string),
            ..Default::default()
        };
    }
}
