//! Bus discovery.

use crate::codec::{CommandParams, FaultFlags};
use crate::error::{Error, Result};
use crate::protocol::{MotorId, Opcode};
use crate::session::Session;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct MotorInfo {
    pub motor_id: u8,
    pub is_online: bool,
    pub temperature: Option<i16>,
    pub voltage: Option<f64>,
    pub faults: Option<FaultFlags>,
    pub response_time_ms: u64,
}

impl MotorInfo {
    fn offline(motor_id: MotorId) -> Self {
        Self {
            motor_id: motor_id.get(),
            is_online: false,
            temperature: None,
            voltage: None,
            faults: None,
            response_time_ms: 0,
        }
    }
}

impl Session {
    /// Probe one motor with a state-1 read. A silent motor, or one whose
    /// reply does not decode, is reported offline rather than as an error.
    pub fn ping(&self, motor_id: MotorId, timeout: Duration) -> Result<MotorInfo> {
        let start = Instant::now();
        match self.send_command(motor_id, Opcode::ReadState1, &CommandParams::new(), timeout) {
            Ok(telemetry) => Ok(MotorInfo {
                motor_id: motor_id.get(),
                is_online: true,
                temperature: telemetry.temperature,
                voltage: telemetry.voltage,
                faults: telemetry.fault_flags,
                response_time_ms: start.elapsed().as_millis() as u64,
            }),
            Err(Error::Timeout { .. }) => {
                debug!("Motor {} did not answer ping", motor_id);
                Ok(MotorInfo::offline(motor_id))
            }
            Err(Error::Decoding(e)) => {
                warn!("Motor {} sent a malformed ping reply: {}", motor_id, e);
                Ok(MotorInfo::offline(motor_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Ping every id in `start..=end`, in order.
    pub fn scan_range(&self, start: MotorId, end: MotorId, timeout: Duration) -> Result<Vec<MotorInfo>> {
        let mut motors = Vec::new();
        for id in start.get()..=end.get() {
            motors.push(self.ping(MotorId::new(id)?, timeout)?);
        }
        Ok(motors)
    }
}
