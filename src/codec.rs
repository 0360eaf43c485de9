//! Table-driven frame codec.
//!
//! Pure functions only: every opcode's byte layout comes from
//! [`PROTOCOL_TABLE`](crate::protocol::PROTOCOL_TABLE), there is no
//! per-opcode branching here.

use crate::bus::RawFrame;
use crate::error::{DecodingError, EncodingError};
use crate::protocol::{lookup, Field, FieldSpec, MotorId, Opcode, FRAME_LEN};

/// Parameter values for one command, in engineering units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommandParams {
    values: [Option<f64>; Field::COUNT],
}

impl CommandParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field, value: f64) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: Field, value: f64) {
        self.values[field.index()] = Some(value);
    }

    pub fn get(&self, field: Field) -> Option<f64> {
        self.values[field.index()]
    }
}

/// Encoded command, ready to transmit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub motor_id: MotorId,
    pub opcode: Opcode,
    pub payload: [u8; FRAME_LEN],
}

impl CommandFrame {
    pub fn arbitration_id(&self) -> u16 {
        self.motor_id.arbitration_id()
    }

    pub fn to_raw(&self) -> RawFrame {
        RawFrame::new_standard(self.arbitration_id(), &self.payload)
    }
}

/// Error-state bits reported by `ReadState1` / `ClearErrors`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultFlags(u8);

impl FaultFlags {
    pub const UNDER_VOLTAGE: u8 = 0x01;
    pub const OVER_TEMPERATURE: u8 = 0x08;

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn under_voltage(self) -> bool {
        self.0 & Self::UNDER_VOLTAGE != 0
    }

    pub fn over_temperature(self) -> bool {
        self.0 & Self::OVER_TEMPERATURE != 0
    }
}

/// Health snapshot taken from a state-1 reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultReport {
    pub motor_id: MotorId,
    pub temperature: i16,
    pub voltage: f64,
    pub flags: FaultFlags,
}

impl FaultReport {
    pub fn is_healthy(&self) -> bool {
        self.flags.is_empty()
    }
}

/// Decoded reply.
///
/// Which fields are present depends on the opcode: a `ReadState2` reply
/// carries temperature, current, velocity and position, a `ReadState1`
/// reply carries temperature, voltage and fault flags, and so on.
/// Units: degrees, degrees/s, amperes, °C, volts, degrees/s².
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame {
    pub motor_id: MotorId,
    pub opcode: Opcode,
    pub position: Option<f64>,
    pub velocity: Option<f64>,
    pub current: Option<f64>,
    pub temperature: Option<i16>,
    pub voltage: Option<f64>,
    pub acceleration: Option<f64>,
    pub fault_flags: Option<FaultFlags>,
}

impl TelemetryFrame {
    fn empty(motor_id: MotorId, opcode: Opcode) -> Self {
        Self {
            motor_id,
            opcode,
            position: None,
            velocity: None,
            current: None,
            temperature: None,
            voltage: None,
            acceleration: None,
            fault_flags: None,
        }
    }

    /// `None` unless this reply carries the motor's error state.
    pub fn fault_report(&self) -> Option<FaultReport> {
        Some(FaultReport {
            motor_id: self.motor_id,
            temperature: self.temperature?,
            voltage: self.voltage?,
            flags: self.fault_flags?,
        })
    }

    fn apply(&mut self, spec: &FieldSpec, raw: i64) {
        let value = raw as f64 * spec.scale;
        match spec.field {
            Field::Position => self.position = Some(value),
            Field::Velocity => self.velocity = Some(value),
            Field::Current => self.current = Some(value),
            Field::Temperature => self.temperature = Some(value.round() as i16),
            Field::Voltage => self.voltage = Some(value),
            Field::Acceleration => self.acceleration = Some(value),
            Field::FaultFlags => self.fault_flags = Some(FaultFlags::from_bits(raw as u8)),
            // request-only
            Field::MaxSpeed | Field::Direction => {}
        }
    }
}

/// Serialize a command into its 8-byte frame.
pub fn encode(
    motor_id: MotorId,
    opcode: Opcode,
    params: &CommandParams,
) -> Result<CommandFrame, EncodingError> {
    let mut payload = [0u8; FRAME_LEN];
    payload[0] = opcode.code();

    for spec in opcode.spec().request {
        let value = params
            .get(spec.field)
            .ok_or(EncodingError::MissingParameter {
                opcode: opcode.code(),
                field: spec.field,
            })?;
        write_raw(&mut payload, spec, to_raw(spec, value)?);
    }

    Ok(CommandFrame {
        motor_id,
        opcode,
        payload,
    })
}

/// Decode a motor reply.
pub fn decode(frame: &RawFrame) -> Result<TelemetryFrame, DecodingError> {
    let motor_id = reply_motor_id(frame)?;
    let payload = checked_payload(frame)?;
    let spec = lookup(payload[0]).ok_or(DecodingError::UnknownOpcode { opcode: payload[0] })?;

    let mut telemetry = TelemetryFrame::empty(motor_id, spec.opcode);
    for field in spec.reply {
        telemetry.apply(field, read_raw(payload, field));
    }
    Ok(telemetry)
}

/// Inverse of [`encode`]: recover the parameters of a command frame.
///
/// Used by simulated motors on a [`VirtualBus`](crate::bus::VirtualBus).
pub fn decode_request(frame: &RawFrame) -> Result<(MotorId, Opcode, CommandParams), DecodingError> {
    let motor_id = reply_motor_id(frame)?;
    let payload = checked_payload(frame)?;
    let spec = lookup(payload[0]).ok_or(DecodingError::UnknownOpcode { opcode: payload[0] })?;

    let mut params = CommandParams::new();
    for field in spec.request {
        params.set(field.field, read_raw(payload, field) as f64 * field.scale);
    }
    Ok((motor_id, spec.opcode, params))
}

/// Correlation key of a frame, even when its payload is malformed.
pub fn reply_key(frame: &RawFrame) -> Option<(MotorId, u8)> {
    let motor_id = reply_motor_id(frame).ok()?;
    frame.data().first().map(|&code| (motor_id, code))
}

fn reply_motor_id(frame: &RawFrame) -> Result<MotorId, DecodingError> {
    let unknown = DecodingError::UnknownArbitrationId { id: frame.id };
    if frame.is_extended {
        return Err(unknown);
    }
    u16::try_from(frame.id)
        .ok()
        .and_then(MotorId::from_arbitration_id)
        .ok_or(unknown)
}

fn checked_payload(frame: &RawFrame) -> Result<&[u8], DecodingError> {
    let payload = frame.data();
    if payload.len() != FRAME_LEN {
        return Err(DecodingError::InvalidLength {
            expected: FRAME_LEN,
            actual: payload.len(),
        });
    }
    Ok(payload)
}

fn to_raw(spec: &FieldSpec, value: f64) -> Result<i64, EncodingError> {
    let (min, max) = spec.raw_range();
    let out_of_range = EncodingError::OutOfRange {
        field: spec.field,
        value,
        min,
        max,
    };
    if !value.is_finite() {
        return Err(out_of_range);
    }
    let raw = (value / spec.scale).round();
    if raw < min as f64 || raw > max as f64 {
        return Err(out_of_range);
    }
    Ok(raw as i64)
}

fn write_raw(payload: &mut [u8; FRAME_LEN], spec: &FieldSpec, raw: i64) {
    let bytes = raw.to_le_bytes();
    payload[spec.offset..spec.offset + spec.width].copy_from_slice(&bytes[..spec.width]);
}

fn read_raw(payload: &[u8], spec: &FieldSpec) -> i64 {
    let mut bytes = [0u8; 8];
    bytes[..spec.width].copy_from_slice(&payload[spec.offset..spec.offset + spec.width]);
    let value = u64::from_le_bytes(bytes);
    if spec.signed {
        // sign-extend from the field width
        let shift = 64 - (spec.width * 8) as u32;
        ((value << shift) as i64) >> shift
    } else {
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ANGLE_SCALE;

    fn motor(id: u8) -> MotorId {
        MotorId::new(id).unwrap()
    }

    fn reply(id: u16, payload: [u8; 8]) -> RawFrame {
        RawFrame::new_standard(id, &payload)
    }

    #[test]
    fn test_encode_speed_control() {
        // 100 dps -> 10000 (0x2710) at 0.01dps/LSB
        let params = CommandParams::new().with(Field::Velocity, 100.0);
        let frame = encode(motor(1), Opcode::SpeedControl, &params).unwrap();

        assert_eq!(frame.arbitration_id(), 0x141);
        assert_eq!(frame.payload, [0xA2, 0, 0, 0, 0x10, 0x27, 0, 0]);
    }

    #[test]
    fn test_encode_negative_position() {
        let params = CommandParams::new().with(Field::Position, -90.0);
        let frame = encode(motor(3), Opcode::MultiTurnPosition, &params).unwrap();

        assert_eq!(frame.to_raw().id, 0x143);
        assert_eq!(&frame.payload[4..8], &(-9000i32).to_le_bytes());
    }

    #[test]
    fn test_encode_position_with_speed() {
        let params = CommandParams::new()
            .with(Field::Position, 360.0)
            .with(Field::MaxSpeed, 500.0);
        let frame = encode(motor(2), Opcode::MultiTurnPositionSpeed, &params).unwrap();

        assert_eq!(frame.payload[0], 0xA4);
        assert_eq!(&frame.payload[2..4], &500u16.to_le_bytes());
        assert_eq!(&frame.payload[4..8], &36000i32.to_le_bytes());
    }

    #[test]
    fn test_encode_no_parameters() {
        let frame = encode(motor(1), Opcode::MotorOn, &CommandParams::new()).unwrap();
        assert_eq!(frame.payload, [0x88, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_missing_parameter() {
        let err = encode(motor(1), Opcode::SpeedControl, &CommandParams::new()).unwrap_err();
        assert_eq!(
            err,
            EncodingError::MissingParameter {
                opcode: 0xA2,
                field: Field::Velocity
            }
        );
    }

    #[test]
    fn test_encode_out_of_range() {
        // beyond the ±2000 protocol limit although it fits in an i16
        let params = CommandParams::new().with(Field::Current, 33.0);
        assert!(matches!(
            encode(motor(1), Opcode::TorqueControl, &params),
            Err(EncodingError::OutOfRange { field: Field::Current, .. })
        ));

        let params = CommandParams::new().with(Field::Velocity, 3.0e7);
        assert!(matches!(
            encode(motor(1), Opcode::SpeedControl, &params),
            Err(EncodingError::OutOfRange { .. })
        ));

        let params = CommandParams::new()
            .with(Field::Direction, 0.0)
            .with(Field::MaxSpeed, -1.0)
            .with(Field::Position, 10.0);
        assert!(matches!(
            encode(motor(1), Opcode::SingleTurnPositionSpeed, &params),
            Err(EncodingError::OutOfRange { field: Field::MaxSpeed, .. })
        ));

        let params = CommandParams::new().with(Field::Velocity, f64::NAN);
        assert!(encode(motor(1), Opcode::SpeedControl, &params).is_err());
    }

    #[test]
    fn test_decode_state2() {
        // temp 35°C, iq 1024, speed -120dps, angle raw 1000
        let mut payload = [0x9C, 35, 0, 0, 0, 0, 0, 0];
        payload[2..4].copy_from_slice(&1024i16.to_le_bytes());
        payload[4..6].copy_from_slice(&(-120i16).to_le_bytes());
        payload[6..8].copy_from_slice(&1000u16.to_le_bytes());

        let telemetry = decode(&reply(0x142, payload)).unwrap();
        assert_eq!(telemetry.motor_id, motor(2));
        assert_eq!(telemetry.opcode, Opcode::ReadState2);
        assert_eq!(telemetry.temperature, Some(35));
        assert!((telemetry.current.unwrap() - 16.5).abs() < 1e-9);
        assert_eq!(telemetry.velocity, Some(-120.0));
        assert!((telemetry.position.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(telemetry.voltage, None);
        assert!(telemetry.fault_report().is_none());
    }

    #[test]
    fn test_decode_state1_fault_report() {
        let mut payload = [0x9A, 0xF6, 0, 0, 0, 0, 0, 0x09];
        payload[3..5].copy_from_slice(&240u16.to_le_bytes());

        let telemetry = decode(&reply(0x141, payload)).unwrap();
        let report = telemetry.fault_report().unwrap();
        assert_eq!(report.temperature, -10);
        assert!((report.voltage - 24.0).abs() < 1e-9);
        assert!(report.flags.under_voltage());
        assert!(report.flags.over_temperature());
        assert!(!report.is_healthy());
    }

    #[test]
    fn test_decode_multi_turn_angle_sign_extends() {
        let raw: i64 = -123_456;
        let mut payload = [0x92, 0, 0, 0, 0, 0, 0, 0];
        payload[1..8].copy_from_slice(&raw.to_le_bytes()[..7]);

        let telemetry = decode(&reply(0x141, payload)).unwrap();
        assert!((telemetry.position.unwrap() - raw as f64 * ANGLE_SCALE).abs() < 1e-9);
    }

    #[test]
    fn test_decode_wrong_length() {
        let frame = RawFrame::new_standard(0x141, &[0x9C, 0, 0, 0]);
        assert_eq!(
            decode(&frame),
            Err(DecodingError::InvalidLength {
                expected: 8,
                actual: 4
            })
        );
    }

    #[test]
    fn test_decode_unknown_opcode() {
        assert_eq!(
            decode(&reply(0x141, [0x55, 0, 0, 0, 0, 0, 0, 0])),
            Err(DecodingError::UnknownOpcode { opcode: 0x55 })
        );
    }

    #[test]
    fn test_decode_foreign_arbitration_id() {
        assert!(matches!(
            decode(&reply(0x280, [0x9C, 0, 0, 0, 0, 0, 0, 0])),
            Err(DecodingError::UnknownArbitrationId { id: 0x280 })
        ));
        let extended = RawFrame::new_extended(0x141, &[0x9C, 0, 0, 0, 0, 0, 0, 0]);
        assert!(decode(&extended).is_err());
    }

    #[test]
    fn test_reply_key_of_malformed_frame() {
        let frame = RawFrame::new_standard(0x145, &[0xA2, 1, 2]);
        assert_eq!(reply_key(&frame), Some((motor(5), 0xA2)));
        assert_eq!(reply_key(&RawFrame::new_standard(0x145, &[])), None);
        assert_eq!(reply_key(&RawFrame::new_standard(0x300, &[0xA2])), None);
    }

    #[test]
    fn test_write_acceleration_round_trip() {
        let params = CommandParams::new().with(Field::Acceleration, 1500.0);
        let frame = encode(motor(4), Opcode::WriteAcceleration, &params).unwrap();
        let telemetry = decode(&frame.to_raw()).unwrap();
        assert_eq!(telemetry.acceleration, Some(1500.0));
    }

    #[test]
    fn test_decode_request_inverts_encode() {
        let params = CommandParams::new()
            .with(Field::Direction, 1.0)
            .with(Field::MaxSpeed, 90.0)
            .with(Field::Position, 270.5);
        let frame = encode(motor(7), Opcode::SingleTurnPositionSpeed, &params).unwrap();

        let (id, opcode, decoded) = decode_request(&frame.to_raw()).unwrap();
        assert_eq!(id, motor(7));
        assert_eq!(opcode, Opcode::SingleTurnPositionSpeed);
        assert_eq!(decoded.get(Field::Direction), Some(1.0));
        assert_eq!(decoded.get(Field::MaxSpeed), Some(90.0));
        assert!((decoded.get(Field::Position).unwrap() - 270.5).abs() < 1e-9);
    }
}
