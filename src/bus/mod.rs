//! CAN bus abstraction.
//!
//! The session only needs two things from a bus: transmit a frame, and wait a
//! bounded time for the next received one. Both take `&self` so the receive
//! thread and callers can share one handle.

use crate::error::BusError;
use std::time::Duration;

pub mod socketcan;
pub mod virtual_bus;

pub use self::socketcan::SocketCanBus;
pub use self::virtual_bus::{virtual_bus, VirtualBus, VirtualBusPeer};

/// Plain CAN 2.0 data frame as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame {
    pub id: u32,
    pub data: [u8; 8],
    pub dlc: u8,
    pub is_extended: bool,
}

impl RawFrame {
    /// Standard (11-bit) frame. Payload beyond 8 bytes is dropped.
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::with_id(id as u32, data, false)
    }

    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::with_id(id, data, true)
    }

    fn with_id(id: u32, data: &[u8], is_extended: bool) -> Self {
        let len = data.len().min(8);
        let mut buf = [0u8; 8];
        buf[..len].copy_from_slice(&data[..len]);
        Self {
            id,
            data: buf,
            dlc: len as u8,
            is_extended,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..self.dlc as usize]
    }
}

pub trait CanBus: Send + Sync {
    fn send(&self, frame: &RawFrame) -> Result<(), BusError>;

    /// Waits up to `timeout` for the next data frame. `Ok(None)` on timeout.
    fn receive(&self, timeout: Duration) -> Result<Option<RawFrame>, BusError>;
}
