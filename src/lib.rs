//! LK Motor Control Library
//!
//! Command/telemetry driver for LK servo motors on a CAN bus.
//!
//! - [`codec`] turns typed commands into 8-byte frames and replies back into
//!   [`TelemetryFrame`]s, driven by the layout table in [`protocol`].
//! - [`Session`] owns the bus and matches replies to waiting requests.
//! - [`LkMotor`] is the per-motor API on top of a shared session.
//!
//! ```no_run
//! use lk_motor_control::{LkMotor, MotorId, Session, SessionConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> lk_motor_control::Result<()> {
//! let session = Arc::new(Session::open_socketcan(SessionConfig::with_interface("can0"))?);
//! let motor = LkMotor::new(Arc::clone(&session), MotorId::new(1)?);
//!
//! motor.enable()?;
//! motor.set_velocity(360.0)?;
//! let state = motor.read_state()?;
//! println!("angle {:?}°, speed {:?} dps", state.position, state.velocity);
//! motor.disable()?;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod motor;
pub mod protocol;
pub mod scanner;
pub mod session;

pub use bus::{virtual_bus, CanBus, RawFrame, SocketCanBus, VirtualBus, VirtualBusPeer};
pub use codec::{decode, encode, CommandFrame, CommandParams, FaultFlags, FaultReport, TelemetryFrame};
pub use config::SessionConfig;
pub use error::{BusError, DecodingError, EncodingError, Error, Result};
pub use motor::{LkMotor, SpinDirection};
pub use protocol::{Field, MotorId, Opcode};
pub use scanner::MotorInfo;
pub use session::Session;
