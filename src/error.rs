//! Error types for the codec, the bus layer and the session.

use crate::protocol::Field;
use thiserror::Error;

/// A command could not be turned into a CAN frame.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("Motor id {id} out of range (1..={max})")]
    InvalidMotorId { id: u8, max: u8 },

    #[error("Unknown opcode 0x{opcode:02X}")]
    UnknownOpcode { opcode: u8 },

    #[error("Missing parameter {field:?} for opcode 0x{opcode:02X}")]
    MissingParameter { opcode: u8, field: Field },

    #[error("Parameter {field:?} = {value} does not fit its field (raw {min}..={max})")]
    OutOfRange {
        field: Field,
        value: f64,
        min: i64,
        max: i64,
    },
}

/// A received CAN frame could not be turned into telemetry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodingError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Arbitration id 0x{id:03X} is not a motor reply")]
    UnknownArbitrationId { id: u32 },

    #[error("Unknown opcode 0x{opcode:02X}")]
    UnknownOpcode { opcode: u8 },
}

/// Errors reported by a [`CanBus`](crate::bus::CanBus) implementation.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid CAN frame: {0}")]
    InvalidFrame(String),

    #[error("Bus disconnected")]
    Disconnected,
}

/// Top-level error returned by [`Session`](crate::Session) and [`LkMotor`](crate::LkMotor).
#[derive(Error, Debug)]
pub enum Error {
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Decoding error: {0}")]
    Decoding(#[from] DecodingError),

    #[error("Timeout waiting for reply 0x{opcode:02X} from motor {motor_id}")]
    Timeout { motor_id: u8, opcode: u8 },

    #[error("Request 0x{opcode:02X} to motor {motor_id} is already pending")]
    RequestConflict { motor_id: u8, opcode: u8 },

    #[error("Session closed")]
    SessionClosed,

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

impl Error {
    /// Only a missed reply is worth retrying; everything else is a protocol
    /// mismatch or a dead session.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
