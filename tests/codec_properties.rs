//! Property tests for the frame codec.

use lk_motor_control::codec::{decode_request, encode};
use lk_motor_control::protocol::{ANGLE_SCALE, CURRENT_SCALE, SPEED_CONTROL_SCALE};
use lk_motor_control::{decode, CommandParams, DecodingError, EncodingError, Field, MotorId, Opcode, RawFrame};
use proptest::prelude::*;

fn close_to(actual: Option<f64>, expected: f64, step: f64) -> bool {
    actual.is_some_and(|a| (a - expected).abs() <= step / 2.0 + 1e-9)
}

proptest! {
    /// Speed set-points survive encoding within one quantization step
    #[test]
    fn speed_roundtrip(id in 1u8..=32, dps in -2.0e7..2.0e7f64) {
        let params = CommandParams::new().with(Field::Velocity, dps);
        let frame = encode(MotorId::new(id).unwrap(), Opcode::SpeedControl, &params).unwrap();
        let (motor, opcode, decoded) = decode_request(&frame.to_raw()).unwrap();

        prop_assert_eq!(motor.get(), id);
        prop_assert_eq!(opcode, Opcode::SpeedControl);
        prop_assert!(close_to(decoded.get(Field::Velocity), dps, SPEED_CONTROL_SCALE));
    }

    #[test]
    fn position_with_speed_roundtrip(deg in -2.0e7..2.0e7f64, max_speed in 0.0..65535.0f64) {
        let params = CommandParams::new()
            .with(Field::Position, deg)
            .with(Field::MaxSpeed, max_speed);
        let frame = encode(MotorId::new(1).unwrap(), Opcode::MultiTurnPositionSpeed, &params).unwrap();
        let (_, _, decoded) = decode_request(&frame.to_raw()).unwrap();

        prop_assert!(close_to(decoded.get(Field::Position), deg, ANGLE_SCALE));
        prop_assert!(close_to(decoded.get(Field::MaxSpeed), max_speed, 1.0));
    }

    #[test]
    fn torque_roundtrip(amps in -32.0..32.0f64) {
        let params = CommandParams::new().with(Field::Current, amps);
        let frame = encode(MotorId::new(5).unwrap(), Opcode::TorqueControl, &params).unwrap();
        let (_, _, decoded) = decode_request(&frame.to_raw()).unwrap();

        prop_assert!(close_to(decoded.get(Field::Current), amps, CURRENT_SCALE));
    }

    /// Write-acceleration replies share the request layout
    #[test]
    fn acceleration_reply_roundtrip(dps2 in 0.0..2.0e9f64) {
        let params = CommandParams::new().with(Field::Acceleration, dps2);
        let frame = encode(MotorId::new(2).unwrap(), Opcode::WriteAcceleration, &params).unwrap();
        let telemetry = decode(&frame.to_raw()).unwrap();

        prop_assert!(close_to(telemetry.acceleration, dps2, 1.0));
    }

    #[test]
    fn torque_beyond_limit_is_rejected(amps in 32.3..1.0e6f64, negative in any::<bool>()) {
        let amps = if negative { -amps } else { amps };
        let params = CommandParams::new().with(Field::Current, amps);
        let result = encode(MotorId::new(1).unwrap(), Opcode::TorqueControl, &params);

        let is_out_of_range = matches!(result, Err(EncodingError::OutOfRange { field: Field::Current, .. }));
        prop_assert!(is_out_of_range);
    }

    #[test]
    fn max_speed_beyond_u16_is_rejected(max_speed in 65535.6..1.0e9f64) {
        let params = CommandParams::new()
            .with(Field::Position, 0.0)
            .with(Field::MaxSpeed, max_speed);
        let result = encode(MotorId::new(1).unwrap(), Opcode::MultiTurnPositionSpeed, &params);

        prop_assert!(result.is_err());
    }

    #[test]
    fn short_payload_is_rejected(len in 0usize..8, byte in any::<u8>()) {
        let frame = RawFrame::new_standard(0x141, &vec![byte; len]);
        prop_assert_eq!(
            decode(&frame),
            Err(DecodingError::InvalidLength { expected: 8, actual: len })
        );
    }

    #[test]
    fn unknown_opcode_is_rejected(code in any::<u8>(), rest in any::<[u8; 7]>()) {
        prop_assume!(Opcode::from_code(code).is_none());
        let mut payload = [code; 8];
        payload[1..].copy_from_slice(&rest);

        prop_assert_eq!(
            decode(&RawFrame::new_standard(0x150, &payload)),
            Err(DecodingError::UnknownOpcode { opcode: code })
        );
    }

    /// Any well-formed reply from a known opcode decodes
    #[test]
    fn known_replies_always_decode(id in 1u16..=32, index in 0usize..17, rest in any::<[u8; 7]>()) {
        let opcode = lk_motor_control::protocol::PROTOCOL_TABLE[index].opcode;
        let mut payload = [opcode.code(); 8];
        payload[1..].copy_from_slice(&rest);

        let telemetry = decode(&RawFrame::new_standard(0x140 + id, &payload)).unwrap();
        prop_assert_eq!(telemetry.opcode, opcode);
        prop_assert_eq!(telemetry.motor_id.get() as u16, id);
    }
}
