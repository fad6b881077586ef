//! Flow controller
//!
//! Tracks whether the firmware has signaled capacity to accept more bytes.
//! This is the single gate that authorizes transmission: the orchestrator
//! may write a chunk only while the controller reports `Ready`, and the
//! act of writing moves it to `Sending` until the next readiness pulse.
//!
//! Application-level readiness signaling is used instead of hardware flow
//! control because the firmware's receive buffer is small and fixed; the
//! host must never race ahead of the firmware's actual consumption rate.
//!
//! Time is injected as `Instant` arguments so the machine is testable
//! without a clock.

use std::time::{Duration, Instant};

/// Flow-control state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FlowState {
    /// No readiness pulse observed yet; the host probes and waits.
    /// Initial state after connect, and the state entered on any
    /// detected stall or peer reset.
    AwaitingReady,
    /// The firmware signaled room for a chunk.
    Ready,
    /// A chunk was written and its readiness pulse is still outstanding.
    Sending,
}

/// State machine gating transmission on the firmware's readiness pulses.
#[derive(Debug)]
pub struct FlowController {
    state: FlowState,
    ready_timeout: Duration,
    probe_interval: Duration,
    sent_at: Option<Instant>,
    last_probe: Option<Instant>,
}

impl FlowController {
    /// Create a controller in `AwaitingReady`.
    pub fn new(ready_timeout: Duration, probe_interval: Duration) -> Self {
        Self {
            state: FlowState::AwaitingReady,
            ready_timeout,
            probe_interval,
            sent_at: None,
            last_probe: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// True when a chunk may be written.
    pub fn can_send(&self) -> bool {
        self.state == FlowState::Ready
    }

    /// A readiness pulse arrived. In `Sending` this acknowledges the
    /// outstanding chunk; while already `Ready` it merely re-affirms.
    pub fn on_ready_pulse(&mut self) {
        self.state = FlowState::Ready;
        self.sent_at = None;
        self.last_probe = None;
    }

    /// The firmware's boot banner was seen: the peer reset, its receive
    /// buffer is empty, and no prior flow state survives.
    pub fn on_banner(&mut self) {
        self.state = FlowState::AwaitingReady;
        self.sent_at = None;
        self.last_probe = None;
    }

    /// A chunk was written; wait for the next pulse before sending more.
    /// Only legal while `Ready`.
    pub fn mark_sent(&mut self, now: Instant) {
        debug_assert!(self.can_send(), "mark_sent while {:?}", self.state);
        self.state = FlowState::Sending;
        self.sent_at = Some(now);
    }

    /// Check for a readiness-wait timeout while `Sending`. On a stall the
    /// controller reverts to `AwaitingReady` and returns true so the
    /// orchestrator can apply its stall policy.
    pub fn check_stall(&mut self, now: Instant) -> bool {
        if self.state != FlowState::Sending {
            return false;
        }
        match self.sent_at {
            Some(sent_at) if now.duration_since(sent_at) >= self.ready_timeout => {
                self.state = FlowState::AwaitingReady;
                self.sent_at = None;
                self.last_probe = None;
                true
            }
            _ => false,
        }
    }

    /// Whether a request-ready probe should be written this tick.
    /// Rate-limited so a silent peer is re-probed, not flooded.
    pub fn should_probe(&mut self, now: Instant) -> bool {
        if self.state != FlowState::AwaitingReady {
            return false;
        }
        let due = match self.last_probe {
            None => true,
            Some(prev) => now.duration_since(prev) >= self.probe_interval,
        };
        if due {
            self.last_probe = Some(now);
        }
        due
    }

    /// Drop back to the initial state, forgetting all timers.
    pub fn reset(&mut self) {
        self.state = FlowState::AwaitingReady;
        self.sent_at = None;
        self.last_probe = None;
    }

    /// The configured readiness-wait timeout.
    pub fn ready_timeout(&self) -> Duration {
        self.ready_timeout
    }
}
