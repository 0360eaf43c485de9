//! Simulated LK motors for integration tests.

#![allow(dead_code)]

use lk_motor_control::codec::decode_request;
use lk_motor_control::{virtual_bus, Field, Opcode, RawFrame, Session, SessionConfig, VirtualBusPeer};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Raw register state of one simulated motor.
#[derive(Debug, Clone, Default)]
pub struct MotorState {
    pub enabled: bool,
    pub temperature: i8,
    pub voltage_raw: u16,
    pub error_state: u8,
    pub iq_raw: i16,
    pub speed_raw: i16,
    pub encoder_angle_raw: u16,
    pub multi_turn_raw: i64,
    pub acceleration_raw: i32,
}

pub fn state2_payload(opcode: u8, state: &MotorState) -> [u8; 8] {
    let mut data = [opcode, state.temperature as u8, 0, 0, 0, 0, 0, 0];
    data[2..4].copy_from_slice(&state.iq_raw.to_le_bytes());
    data[4..6].copy_from_slice(&state.speed_raw.to_le_bytes());
    data[6..8].copy_from_slice(&state.encoder_angle_raw.to_le_bytes());
    data
}

pub fn state1_payload(opcode: u8, state: &MotorState) -> [u8; 8] {
    let mut data = [opcode, state.temperature as u8, 0, 0, 0, 0, 0, state.error_state];
    data[3..5].copy_from_slice(&state.voltage_raw.to_le_bytes());
    data
}

/// Reply a real motor would give to `frame`, updating `state` on the way.
pub fn respond(state: &mut MotorState, frame: &RawFrame) -> Option<RawFrame> {
    let (_, opcode, params) = decode_request(frame).ok()?;
    let code = opcode.code();
    let payload = match opcode {
        Opcode::MotorOn => {
            state.enabled = true;
            [code, 0, 0, 0, 0, 0, 0, 0]
        }
        Opcode::MotorOff => {
            state.enabled = false;
            state.speed_raw = 0;
            [code, 0, 0, 0, 0, 0, 0, 0]
        }
        Opcode::MotorStop | Opcode::SetZeroPosition => {
            state.speed_raw = 0;
            [code, 0, 0, 0, 0, 0, 0, 0]
        }
        Opcode::ReadState1 => state1_payload(code, state),
        Opcode::ClearErrors => {
            state.error_state = 0;
            state1_payload(code, state)
        }
        Opcode::ReadState2 => state2_payload(code, state),
        Opcode::SpeedControl => {
            // settle instantly at the target
            state.speed_raw = params.get(Field::Velocity)?.round() as i16;
            state2_payload(code, state)
        }
        Opcode::TorqueControl => {
            state.iq_raw = (params.get(Field::Current)? * 2048.0 / 33.0).round() as i16;
            state2_payload(code, state)
        }
        Opcode::MultiTurnPosition | Opcode::MultiTurnPositionSpeed => {
            state.multi_turn_raw = (params.get(Field::Position)? * 100.0).round() as i64;
            state.encoder_angle_raw = state.multi_turn_raw.rem_euclid(36000) as u16;
            state2_payload(code, state)
        }
        Opcode::SingleTurnPositionSpeed => {
            state.encoder_angle_raw = (params.get(Field::Position)? * 100.0).round() as u16;
            state2_payload(code, state)
        }
        Opcode::IncrementalPositionSpeed => {
            state.multi_turn_raw += (params.get(Field::Position)? * 100.0).round() as i64;
            state.encoder_angle_raw = state.multi_turn_raw.rem_euclid(36000) as u16;
            state2_payload(code, state)
        }
        Opcode::ReadMultiTurnAngle => {
            let mut data = [code, 0, 0, 0, 0, 0, 0, 0];
            data[1..8].copy_from_slice(&state.multi_turn_raw.to_le_bytes()[..7]);
            data
        }
        Opcode::ReadSingleTurnAngle => {
            let mut data = [code, 0, 0, 0, 0, 0, 0, 0];
            data[4..8].copy_from_slice(&(state.encoder_angle_raw as u32).to_le_bytes());
            data
        }
        Opcode::ReadAcceleration => {
            let mut data = [code, 0, 0, 0, 0, 0, 0, 0];
            data[4..8].copy_from_slice(&state.acceleration_raw.to_le_bytes());
            data
        }
        Opcode::WriteAcceleration => {
            state.acceleration_raw = params.get(Field::Acceleration)?.round() as i32;
            let mut data = [code, 0, 0, 0, 0, 0, 0, 0];
            data[4..8].copy_from_slice(&state.acceleration_raw.to_le_bytes());
            data
        }
    };
    Some(RawFrame::new_standard(frame.id as u16, &payload))
}

/// Answer for every motor in `motors` (keyed by motor id), stay silent for the rest.
pub fn spawn_motors(peer: VirtualBusPeer, mut motors: HashMap<u8, MotorState>) -> JoinHandle<()> {
    peer.spawn_responder(move |frame| {
        let motor_id = u8::try_from(frame.id.checked_sub(0x140)?).ok()?;
        let state = motors.get_mut(&motor_id)?;
        respond(state, frame)
    })
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        response_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(1),
        ..SessionConfig::default()
    }
}

/// Session over a virtual bus; the peer end is returned for the test to drive.
pub fn open_session() -> (Arc<Session>, VirtualBusPeer) {
    let (bus, peer) = virtual_bus();
    let session = Session::open(bus, test_config()).expect("open session");
    (Arc::new(session), peer)
}

/// Session whose bus is answered by simulated motors.
pub fn open_simulated(motors: HashMap<u8, MotorState>) -> (Arc<Session>, JoinHandle<()>) {
    let (bus, peer) = virtual_bus();
    let responder = spawn_motors(peer, motors);
    let session = Session::open(bus, test_config()).expect("open session");
    (Arc::new(session), responder)
}

/// Wait until `session` has `count` requests in flight.
pub fn wait_for_pending(session: &Session, count: usize) {
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while session.pending_count() != count {
        assert!(std::time::Instant::now() < deadline, "pending count never reached {}", count);
        std::thread::sleep(Duration::from_millis(1));
    }
}
