//! LK motor CAN protocol constants and the opcode field-layout table.
//!
//! Every single-motor command is a standard 8-byte data frame sent to
//! `0x140 + motor_id`; the motor answers from the same identifier and echoes
//! the command byte in `data[0]`. All multi-byte fields are little-endian.

use crate::error::EncodingError;
use std::fmt;

pub const ARBITRATION_BASE: u16 = 0x140;
pub const MOTOR_ID_MAX: u8 = 32;
pub const FRAME_LEN: usize = 8;

// Protocol coefficients
pub const ANGLE_SCALE: f64 = 0.01; // 0.01°/LSB
pub const SPEED_CONTROL_SCALE: f64 = 0.01; // 0.01dps/LSB
pub const SPEED_SCALE: f64 = 1.0; // 1dps/LSB
pub const CURRENT_SCALE: f64 = 33.0 / 2048.0; // ±2048 -> ±33A
pub const VOLTAGE_SCALE: f64 = 0.1; // 0.1V/LSB
pub const TORQUE_RAW_LIMIT: i64 = 2000;
pub const SINGLE_TURN_RAW_MAX: i64 = 35999;

/// Logical motor address on the bus (1..=32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MotorId(u8);

impl MotorId {
    pub fn new(id: u8) -> Result<Self, EncodingError> {
        if (1..=MOTOR_ID_MAX).contains(&id) {
            Ok(Self(id))
        } else {
            Err(EncodingError::InvalidMotorId {
                id,
                max: MOTOR_ID_MAX,
            })
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Identifier used for commands to, and replies from, this motor.
    pub fn arbitration_id(self) -> u16 {
        ARBITRATION_BASE + self.0 as u16
    }

    pub fn from_arbitration_id(id: u16) -> Option<Self> {
        id.checked_sub(ARBITRATION_BASE)
            .and_then(|offset| u8::try_from(offset).ok())
            .and_then(|offset| Self::new(offset).ok())
    }
}

impl fmt::Display for MotorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Command byte carried in `data[0]` of every frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    SetZeroPosition = 0x19,
    ReadAcceleration = 0x33,
    WriteAcceleration = 0x34,
    MotorOff = 0x80,
    MotorStop = 0x81,
    MotorOn = 0x88,
    ReadMultiTurnAngle = 0x92,
    ReadSingleTurnAngle = 0x94,
    ReadState1 = 0x9A,
    ClearErrors = 0x9B,
    ReadState2 = 0x9C,
    TorqueControl = 0xA1,
    SpeedControl = 0xA2,
    MultiTurnPosition = 0xA3,
    MultiTurnPositionSpeed = 0xA4,
    SingleTurnPositionSpeed = 0xA6,
    IncrementalPositionSpeed = 0xA8,
}

impl Opcode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        lookup(code).map(|spec| spec.opcode)
    }

    /// Layout entry for this opcode.
    pub fn spec(self) -> &'static OpcodeSpec {
        PROTOCOL_TABLE
            .iter()
            .find(|spec| spec.opcode == self)
            .unwrap_or_else(|| unreachable!("every opcode has a table entry"))
    }

    /// Motors echo the command byte, so the reply carries the same opcode.
    pub fn reply_opcode(self) -> Opcode {
        self
    }
}

/// Physical quantity a field slot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Temperature,
    Voltage,
    Current,
    Velocity,
    Position,
    Acceleration,
    FaultFlags,
    MaxSpeed,
    Direction,
}

impl Field {
    pub const COUNT: usize = 9;

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Placement and scaling of one field inside the 8-byte payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub field: Field,
    pub offset: usize,
    pub width: usize,
    pub signed: bool,
    pub scale: f64,
    /// Protocol limits on the raw value, tighter than the width allows.
    pub bounds: Option<(i64, i64)>,
}

impl FieldSpec {
    pub const fn signed(field: Field, offset: usize, width: usize, scale: f64) -> Self {
        Self {
            field,
            offset,
            width,
            signed: true,
            scale,
            bounds: None,
        }
    }

    pub const fn unsigned(field: Field, offset: usize, width: usize, scale: f64) -> Self {
        Self {
            field,
            offset,
            width,
            signed: false,
            scale,
            bounds: None,
        }
    }

    pub const fn bounded(self, min: i64, max: i64) -> Self {
        Self {
            bounds: Some((min, max)),
            ..self
        }
    }

    /// Inclusive raw range accepted on encode.
    pub fn raw_range(&self) -> (i64, i64) {
        let bits = (self.width * 8) as u32;
        let (min, max) = if self.signed {
            (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
        } else {
            (0, (1i64 << bits) - 1)
        };
        match self.bounds {
            Some((lo, hi)) => (min.max(lo), max.min(hi)),
            None => (min, max),
        }
    }
}

/// Request and reply layout of one opcode.
#[derive(Debug)]
pub struct OpcodeSpec {
    pub opcode: Opcode,
    pub name: &'static str,
    pub request: &'static [FieldSpec],
    pub reply: &'static [FieldSpec],
}

const NO_FIELDS: &[FieldSpec] = &[];

const STATE1_REPLY: &[FieldSpec] = &[
    FieldSpec::signed(Field::Temperature, 1, 1, 1.0),
    FieldSpec::unsigned(Field::Voltage, 3, 2, VOLTAGE_SCALE),
    FieldSpec::unsigned(Field::FaultFlags, 7, 1, 1.0),
];

// data[6..8] is the single-turn shaft angle.
const STATE2_REPLY: &[FieldSpec] = &[
    FieldSpec::signed(Field::Temperature, 1, 1, 1.0),
    FieldSpec::signed(Field::Current, 2, 2, CURRENT_SCALE),
    FieldSpec::signed(Field::Velocity, 4, 2, SPEED_SCALE),
    FieldSpec::unsigned(Field::Position, 6, 2, ANGLE_SCALE),
];

const ACCELERATION: &[FieldSpec] =
    &[FieldSpec::signed(Field::Acceleration, 4, 4, 1.0).bounded(0, i32::MAX as i64)];

pub static PROTOCOL_TABLE: [OpcodeSpec; 17] = [
    OpcodeSpec {
        opcode: Opcode::SetZeroPosition,
        name: "set_zero_position",
        request: NO_FIELDS,
        reply: NO_FIELDS,
    },
    OpcodeSpec {
        opcode: Opcode::ReadAcceleration,
        name: "read_acceleration",
        request: NO_FIELDS,
        reply: ACCELERATION,
    },
    OpcodeSpec {
        opcode: Opcode::WriteAcceleration,
        name: "write_acceleration",
        request: ACCELERATION,
        reply: ACCELERATION,
    },
    OpcodeSpec {
        opcode: Opcode::MotorOff,
        name: "motor_off",
        request: NO_FIELDS,
        reply: NO_FIELDS,
    },
    OpcodeSpec {
        opcode: Opcode::MotorStop,
        name: "motor_stop",
        request: NO_FIELDS,
        reply: NO_FIELDS,
    },
    OpcodeSpec {
        opcode: Opcode::MotorOn,
        name: "motor_on",
        request: NO_FIELDS,
        reply: NO_FIELDS,
    },
    OpcodeSpec {
        opcode: Opcode::ReadMultiTurnAngle,
        name: "read_multi_turn_angle",
        request: NO_FIELDS,
        reply: &[FieldSpec::signed(Field::Position, 1, 7, ANGLE_SCALE)],
    },
    OpcodeSpec {
        opcode: Opcode::ReadSingleTurnAngle,
        name: "read_single_turn_angle",
        request: NO_FIELDS,
        reply: &[FieldSpec::unsigned(Field::Position, 4, 4, ANGLE_SCALE)],
    },
    OpcodeSpec {
        opcode: Opcode::ReadState1,
        name: "read_state_1",
        request: NO_FIELDS,
        reply: STATE1_REPLY,
    },
    OpcodeSpec {
        opcode: Opcode::ClearErrors,
        name: "clear_errors",
        request: NO_FIELDS,
        reply: STATE1_REPLY,
    },
    OpcodeSpec {
        opcode: Opcode::ReadState2,
        name: "read_state_2",
        request: NO_FIELDS,
        reply: STATE2_REPLY,
    },
    OpcodeSpec {
        opcode: Opcode::TorqueControl,
        name: "torque_control",
        request: &[FieldSpec::signed(Field::Current, 4, 2, CURRENT_SCALE)
            .bounded(-TORQUE_RAW_LIMIT, TORQUE_RAW_LIMIT)],
        reply: STATE2_REPLY,
    },
    OpcodeSpec {
        opcode: Opcode::SpeedControl,
        name: "speed_control",
        request: &[FieldSpec::signed(Field::Velocity, 4, 4, SPEED_CONTROL_SCALE)],
        reply: STATE2_REPLY,
    },
    OpcodeSpec {
        opcode: Opcode::MultiTurnPosition,
        name: "multi_turn_position",
        request: &[FieldSpec::signed(Field::Position, 4, 4, ANGLE_SCALE)],
        reply: STATE2_REPLY,
    },
    OpcodeSpec {
        opcode: Opcode::MultiTurnPositionSpeed,
        name: "multi_turn_position_speed",
        request: &[
            FieldSpec::unsigned(Field::MaxSpeed, 2, 2, SPEED_SCALE),
            FieldSpec::signed(Field::Position, 4, 4, ANGLE_SCALE),
        ],
        reply: STATE2_REPLY,
    },
    OpcodeSpec {
        opcode: Opcode::SingleTurnPositionSpeed,
        name: "single_turn_position_speed",
        request: &[
            FieldSpec::unsigned(Field::Direction, 1, 1, 1.0).bounded(0, 1),
            FieldSpec::unsigned(Field::MaxSpeed, 2, 2, SPEED_SCALE),
            FieldSpec::unsigned(Field::Position, 4, 4, ANGLE_SCALE).bounded(0, SINGLE_TURN_RAW_MAX),
        ],
        reply: STATE2_REPLY,
    },
    OpcodeSpec {
        opcode: Opcode::IncrementalPositionSpeed,
        name: "incremental_position_speed",
        request: &[
            FieldSpec::unsigned(Field::MaxSpeed, 2, 2, SPEED_SCALE),
            FieldSpec::signed(Field::Position, 4, 4, ANGLE_SCALE),
        ],
        reply: STATE2_REPLY,
    },
];

/// Table entry for a raw opcode byte.
pub fn lookup(code: u8) -> Option<&'static OpcodeSpec> {
    PROTOCOL_TABLE.iter().find(|spec| spec.opcode.code() == code)
}
