use lasaurlink_communication::{
    codec, FailurePolicy, FecMode, FlowState, ManagerConfig, SerialManager, StallPolicy,
    Transport, READY_BYTE, REQUEST_READY_BYTE, TX_CHUNK_SIZE,
};
use lasaurlink_core::{Error, ProtocolError};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// Mock transport for testing: scripted inbound bytes, recorded writes.
#[derive(Default)]
struct MockState {
    rx: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    fail_writes: bool,
}

impl MockState {
    fn push_rx(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }

    fn written(&self) -> Vec<u8> {
        self.writes.iter().flatten().copied().collect()
    }
}

struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        let n = buf.len().min(state.rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.rx.pop_front().unwrap();
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "wire cut"));
        }
        state.writes.push(data.to_vec());
        Ok(data.len())
    }

    fn name(&self) -> String {
        "mock".to_string()
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn connected_manager(config: ManagerConfig) -> (SerialManager, Arc<Mutex<MockState>>) {
    let state = Arc::new(Mutex::new(MockState::default()));
    let transport = Box::new(MockTransport {
        state: state.clone(),
    });
    let mut manager = SerialManager::new(config);
    manager.connect_with(transport).unwrap();
    (manager, state)
}

fn frame_bytes(line: &str, mode: FecMode) -> Vec<u8> {
    codec::encode(line.as_bytes(), mode).unwrap().into_bytes()
}

#[test]
fn connect_emits_a_probe() {
    let (manager, state) = connected_manager(ManagerConfig::default());
    assert!(manager.is_connected());
    assert_eq!(manager.flow_state(), FlowState::AwaitingReady);
    assert_eq!(state.lock().unwrap().written(), vec![REQUEST_READY_BYTE]);
}

#[test]
fn commands_go_out_in_order_one_per_pulse() {
    let (mut manager, state) = connected_manager(ManagerConfig::default());
    manager.queue_gcode("G0 X1\nG0 X2\nG0 X3");

    let now = Instant::now();
    for _ in 0..3 {
        state.lock().unwrap().push_rx(&[READY_BYTE]);
        manager.tick(now).unwrap();
        // Without a fresh pulse, nothing more may go out.
        manager.tick(now).unwrap();
    }

    let mode = FecMode::default();
    let mut expected = vec![REQUEST_READY_BYTE];
    expected.extend(frame_bytes("G0 X1", mode));
    expected.extend(frame_bytes("G0 X2", mode));
    expected.extend(frame_bytes("G0 X3", mode));
    assert_eq!(state.lock().unwrap().written(), expected);
    assert_eq!(manager.queue_len(), 0);
    assert!(manager.status().ready);
}

#[test]
fn long_frames_are_chunked_and_each_chunk_waits_for_a_pulse() {
    let (mut manager, state) = connected_manager(ManagerConfig::default());
    let line = "G1 X123.45 Y678.90 F3000 S255";
    manager.queue_gcode(line);

    let wire = frame_bytes(line, FecMode::default());
    assert!(wire.len() > TX_CHUNK_SIZE);

    let now = Instant::now();
    let mut fed = 0;
    while manager.queue_len() > 0 || manager.flow_state() != FlowState::Ready {
        state.lock().unwrap().push_rx(&[READY_BYTE]);
        manager.tick(now).unwrap();
        fed += 1;
        assert!(fed < 20, "chunking did not converge");
        if manager.status().ready {
            break;
        }
    }

    let written = state.lock().unwrap().written();
    assert_eq!(&written[1..], wire.as_slice());
    // Every chunk fits the firmware's receive buffer.
    for write in state.lock().unwrap().writes.iter().skip(1) {
        assert!(write.len() <= TX_CHUNK_SIZE);
    }
}

#[test]
fn cancel_before_tick_sends_nothing() {
    let (mut manager, state) = connected_manager(ManagerConfig::default());
    manager.queue_gcode("G0 X1\nG0 X2");
    manager.cancel_queue();
    assert_eq!(manager.queue_len(), 0);

    state.lock().unwrap().push_rx(&[READY_BYTE]);
    manager.tick(Instant::now()).unwrap();
    // Only the connect probe ever hit the wire.
    assert_eq!(state.lock().unwrap().written(), vec![REQUEST_READY_BYTE]);
}

#[test]
fn banner_resets_flow_and_status() {
    let (mut manager, state) = connected_manager(ManagerConfig::default());
    manager.queue_gcode("G0 X1\nG0 X2");

    let now = Instant::now();
    state.lock().unwrap().push_rx(&[READY_BYTE]);
    manager.tick(now).unwrap();

    // The firmware reboots mid-session and prints its banner.
    state.lock().unwrap().push_rx(b"LasaurGrbl 1.0\n");
    manager.tick(now).unwrap();

    assert_eq!(manager.flow_state(), FlowState::AwaitingReady);
    assert!(!manager.status().ready);
    assert!(manager.status().firmware_version.is_none());
}

#[test]
fn status_record_replaces_the_snapshot_wholesale() {
    let (mut manager, state) = connected_manager(ManagerConfig::default());
    let now = Instant::now();

    state.lock().unwrap().push_rx(b"LX1.0Y2.0V1.1\n");
    manager.tick(now).unwrap();
    assert!(manager.status().limit_hit);
    assert_eq!(manager.status().x.as_deref(), Some("1.0"));

    // The next record carries no limit flag; it must not linger.
    state.lock().unwrap().push_rx(b"X3.0Y4.0V1.1\n");
    manager.tick(now).unwrap();
    assert!(!manager.status().limit_hit);
    assert_eq!(manager.status().x.as_deref(), Some("3.0"));
}

#[test]
fn stop_record_cancels_the_backlog() {
    let (mut manager, state) = connected_manager(ManagerConfig::default());
    manager.queue_gcode("G0 X1\nG0 X2\nG0 X3");

    state.lock().unwrap().push_rx(b"!PX1.0Y2.0V1.1\n");
    manager.tick(Instant::now()).unwrap();

    assert_eq!(manager.queue_len(), 0);
    assert!(!manager.status().ready);
    assert!(manager.status().power_off);
}

#[test]
fn transmission_error_best_effort_keeps_the_session() {
    let (mut manager, state) = connected_manager(ManagerConfig::default());

    state.lock().unwrap().push_rx(b"TX1.0Y2.0V1.1\n");
    manager.tick(Instant::now()).unwrap();

    assert!(manager.is_connected());
    assert!(manager.status().transmission_error);
    assert!(manager.status().last_error.is_some());
}

#[test]
fn transmission_error_strict_forces_a_reconnect() {
    let config = ManagerConfig {
        failure_policy: FailurePolicy::Strict,
        ..Default::default()
    };
    let (mut manager, state) = connected_manager(config);

    state.lock().unwrap().push_rx(b"TX1.0Y2.0V1.1\n");
    let err = manager.tick(Instant::now()).unwrap_err();

    assert!(matches!(
        err,
        Error::Protocol(ProtocolError::TransmissionError)
    ));
    assert!(!manager.is_connected());
    assert!(manager.status().last_error.is_some());
}

#[test]
fn stall_with_retry_probe_stays_connected() {
    let (mut manager, state) = connected_manager(ManagerConfig::default());
    manager.queue_gcode("G0 X1");

    let t0 = Instant::now();
    state.lock().unwrap().push_rx(&[READY_BYTE]);
    manager.tick(t0).unwrap();
    assert_eq!(manager.flow_state(), FlowState::Sending);

    // No pulse within the ready timeout.
    let later = t0 + Duration::from_secs(3);
    manager.tick(later).unwrap();

    assert!(manager.is_connected());
    assert_eq!(manager.flow_state(), FlowState::AwaitingReady);
    let last_error = manager.status().last_error.unwrap();
    assert!(last_error.contains("stall"));
    // The stall tick re-solicited readiness.
    assert_eq!(
        state.lock().unwrap().writes.last().unwrap(),
        &vec![REQUEST_READY_BYTE]
    );
}

#[test]
fn stall_with_abort_drops_the_connection() {
    let config = ManagerConfig {
        stall_policy: StallPolicy::Abort,
        ..Default::default()
    };
    let (mut manager, state) = connected_manager(config);
    manager.queue_gcode("G0 X1");

    let t0 = Instant::now();
    state.lock().unwrap().push_rx(&[READY_BYTE]);
    manager.tick(t0).unwrap();

    let err = manager.tick(t0 + Duration::from_secs(3)).unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    assert!(!manager.is_connected());
}

#[test]
fn stop_marker_bypasses_flow_control() {
    let (mut manager, state) = connected_manager(ManagerConfig::default());
    manager.queue_gcode("G0 X1\nG0 X2");
    manager.queue_gcode("!");

    // No readiness pulse ever arrives, yet the stop goes out raw.
    manager.tick(Instant::now()).unwrap();

    let written = state.lock().unwrap().written();
    assert_eq!(written, vec![REQUEST_READY_BYTE, b'!']);
    assert_eq!(manager.queue_len(), 0);
}

#[test]
fn write_failure_surfaces_as_connection_lost() {
    let (mut manager, state) = connected_manager(ManagerConfig::default());
    manager.queue_gcode("G0 X1");
    state.lock().unwrap().fail_writes = true;

    state.lock().unwrap().push_rx(&[READY_BYTE]);
    let err = manager.tick(Instant::now()).unwrap_err();

    assert!(err.is_connection_lost());
    assert!(!manager.is_connected());
    assert!(manager.status().last_error.is_some());
}

#[test]
fn paused_manager_holds_the_line_and_resumes() {
    let (mut manager, state) = connected_manager(ManagerConfig::default());
    manager.queue_gcode("G0 X1");
    assert!(manager.set_pause(true));

    let now = Instant::now();
    state.lock().unwrap().push_rx(&[READY_BYTE]);
    manager.tick(now).unwrap();
    assert_eq!(state.lock().unwrap().written(), vec![REQUEST_READY_BYTE]);

    manager.set_pause(false);
    manager.tick(now).unwrap();
    let written = state.lock().unwrap().written();
    assert!(written.len() > 1, "resume should release the backlog");
}

#[test]
fn redundant_mode_applies_to_subsequent_commands() {
    let (mut manager, state) = connected_manager(ManagerConfig::default());
    manager.set_fec_redundancy(FecMode::Redundant(1));
    manager.queue_gcode("G0 X1");

    let now = Instant::now();
    let wire = frame_bytes("G0 X1", FecMode::Redundant(1));
    let mut sent = 0;
    while sent < wire.len() {
        state.lock().unwrap().push_rx(&[READY_BYTE]);
        manager.tick(now).unwrap();
        sent = state.lock().unwrap().written().len() - 1;
    }

    assert_eq!(&state.lock().unwrap().written()[1..], wire.as_slice());
}
