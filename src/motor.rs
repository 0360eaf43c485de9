//! Per-motor controller.

use crate::codec::{CommandParams, FaultReport, TelemetryFrame};
use crate::error::{DecodingError, Error, Result};
use crate::protocol::{Field, MotorId, Opcode};
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Rotation direction for single-turn positioning.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinDirection {
    Clockwise = 0,
    CounterClockwise = 1,
}

/// One LK motor on a shared [`Session`].
///
/// Every method except [`shut_down`](LkMotor::shut_down) sends exactly one
/// command and returns the motor's reply.
/// Angles are in degrees, speeds in degrees per second, current in amperes.
#[derive(Clone)]
pub struct LkMotor {
    id: MotorId,
    session: Arc<Session>,
    timeout: Duration,
}

impl LkMotor {
    /// Uses the session's configured reply timeout.
    pub fn new(session: Arc<Session>, id: MotorId) -> Self {
        let timeout = session.config().response_timeout;
        Self { id, session, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn id(&self) -> MotorId {
        self.id
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn command(&self, opcode: Opcode, params: CommandParams) -> Result<TelemetryFrame> {
        self.session.send_command(self.id, opcode, &params, self.timeout)
    }

    fn plain(&self, opcode: Opcode) -> Result<TelemetryFrame> {
        self.command(opcode, CommandParams::new())
    }

    /// Switch the motor on (0x88).
    pub fn enable(&self) -> Result<TelemetryFrame> {
        self.plain(Opcode::MotorOn)
    }

    /// Switch the motor off and clear its control state (0x80).
    pub fn disable(&self) -> Result<TelemetryFrame> {
        self.plain(Opcode::MotorOff)
    }

    /// Stop without clearing control state (0x81).
    pub fn stop(&self) -> Result<TelemetryFrame> {
        self.plain(Opcode::MotorStop)
    }

    /// Stop then switch off, for shutdown paths. A failed stop is logged and
    /// the motor is switched off regardless; the result is that of the 0x80.
    pub fn shut_down(&self) -> Result<TelemetryFrame> {
        if let Err(e) = self.stop() {
            warn!("Motor {} stop failed, disabling anyway: {}", self.id, e);
        }
        self.disable()
    }

    /// Closed-loop speed control (0xA2).
    pub fn set_velocity(&self, dps: f64) -> Result<TelemetryFrame> {
        self.command(Opcode::SpeedControl, CommandParams::new().with(Field::Velocity, dps))
    }

    /// Multi-turn absolute position at the motor's configured max speed (0xA3).
    pub fn set_position(&self, degrees: f64) -> Result<TelemetryFrame> {
        self.command(Opcode::MultiTurnPosition, CommandParams::new().with(Field::Position, degrees))
    }

    /// Multi-turn absolute position with a speed limit (0xA4).
    pub fn set_position_with_speed(&self, degrees: f64, max_speed_dps: f64) -> Result<TelemetryFrame> {
        let params = CommandParams::new()
            .with(Field::Position, degrees)
            .with(Field::MaxSpeed, max_speed_dps);
        self.command(Opcode::MultiTurnPositionSpeed, params)
    }

    /// Single-turn position in `[0, 360)` with direction and speed limit (0xA6).
    pub fn set_single_turn_position(
        &self,
        direction: SpinDirection,
        degrees: f64,
        max_speed_dps: f64,
    ) -> Result<TelemetryFrame> {
        let params = CommandParams::new()
            .with(Field::Direction, direction as u8 as f64)
            .with(Field::Position, degrees)
            .with(Field::MaxSpeed, max_speed_dps);
        self.command(Opcode::SingleTurnPositionSpeed, params)
    }

    /// Move relative to the current position (0xA8).
    pub fn move_by(&self, degrees: f64, max_speed_dps: f64) -> Result<TelemetryFrame> {
        let params = CommandParams::new()
            .with(Field::Position, degrees)
            .with(Field::MaxSpeed, max_speed_dps);
        self.command(Opcode::IncrementalPositionSpeed, params)
    }

    /// Torque (q-axis current) control (0xA1).
    pub fn set_torque_current(&self, amps: f64) -> Result<TelemetryFrame> {
        self.command(Opcode::TorqueControl, CommandParams::new().with(Field::Current, amps))
    }

    /// Temperature, current, speed and shaft angle (0x9C).
    pub fn read_state(&self) -> Result<TelemetryFrame> {
        self.plain(Opcode::ReadState2)
    }

    /// Temperature, bus voltage and error flags (0x9A).
    pub fn read_faults(&self) -> Result<FaultReport> {
        let telemetry = self.plain(Opcode::ReadState1)?;
        fault_report(&telemetry)
    }

    /// Clear latched errors and report what remains (0x9B).
    pub fn clear_faults(&self) -> Result<FaultReport> {
        let telemetry = self.plain(Opcode::ClearErrors)?;
        fault_report(&telemetry)
    }

    pub fn read_multi_turn_angle(&self) -> Result<TelemetryFrame> {
        self.plain(Opcode::ReadMultiTurnAngle)
    }

    pub fn read_single_turn_angle(&self) -> Result<TelemetryFrame> {
        self.plain(Opcode::ReadSingleTurnAngle)
    }

    pub fn read_acceleration(&self) -> Result<TelemetryFrame> {
        self.plain(Opcode::ReadAcceleration)
    }

    /// Acceleration used by speed and position loops, in degrees/s² (0x34).
    pub fn write_acceleration(&self, dps2: f64) -> Result<TelemetryFrame> {
        self.command(Opcode::WriteAcceleration, CommandParams::new().with(Field::Acceleration, dps2))
    }

    /// Store the current position as zero in ROM (0x19). Takes effect after a power cycle.
    pub fn set_zero_position(&self) -> Result<TelemetryFrame> {
        self.plain(Opcode::SetZeroPosition)
    }
}

// state-1 layouts always carry all three fields
fn fault_report(telemetry: &TelemetryFrame) -> Result<FaultReport> {
    telemetry.fault_report().ok_or(Error::Decoding(DecodingError::UnknownOpcode {
        opcode: telemetry.opcode.code(),
    }))
}
