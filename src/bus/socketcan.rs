//! Linux SocketCAN backend.
//!
//! Interface bring-up (bitrate, `ip link set can0 up`) happens outside the
//! library; this only opens an already configured interface.

use super::{CanBus, RawFrame};
use crate::error::BusError;
use ::socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, StandardId};
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::time::Duration;
use tracing::{debug, trace};

// SO_RCVTIMEO of zero means "block forever"
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

pub struct SocketCanBus {
    socket: CanSocket,
    interface: String,
    read_timeout: Mutex<Option<Duration>>,
}

impl SocketCanBus {
    /// Open a CAN interface such as `can0`.
    pub fn open(interface: &str) -> Result<Self, BusError> {
        let socket = CanSocket::open(interface)?;
        debug!("Opened SocketCAN interface {}", interface);

        Ok(Self {
            socket,
            interface: interface.to_string(),
            read_timeout: Mutex::new(None),
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn set_read_timeout(&self, timeout: Duration) -> Result<(), BusError> {
        let timeout = timeout.max(MIN_READ_TIMEOUT);
        let mut current = self.read_timeout.lock();
        if *current != Some(timeout) {
            self.socket.set_read_timeout(timeout)?;
            *current = Some(timeout);
        }
        Ok(())
    }
}

impl CanBus for SocketCanBus {
    fn send(&self, frame: &RawFrame) -> Result<(), BusError> {
        let can_frame = if frame.is_extended {
            ExtendedId::new(frame.id).and_then(|id| CanFrame::new(id, frame.data()))
        } else {
            u16::try_from(frame.id)
                .ok()
                .and_then(StandardId::new)
                .and_then(|id| CanFrame::new(id, frame.data()))
        };
        let can_frame = can_frame
            .ok_or_else(|| BusError::InvalidFrame(format!("cannot build frame with ID 0x{:X}", frame.id)))?;

        self.socket.write_frame(&can_frame)?;
        trace!("Sent CAN frame: ID=0x{:X}, data={:02X?}", frame.id, frame.data());
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<RawFrame>, BusError> {
        self.set_read_timeout(timeout)?;

        let frame = match self.socket.read_frame() {
            Ok(CanFrame::Data(frame)) => frame,
            Ok(CanFrame::Remote(_)) => return Ok(None),
            Ok(CanFrame::Error(frame)) => {
                debug!("Bus error frame on {}: {:?}", self.interface, frame);
                return Ok(None);
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let raw = match frame.id() {
            Id::Standard(id) => RawFrame::new_standard(id.as_raw(), frame.data()),
            Id::Extended(id) => RawFrame::new_extended(id.as_raw(), frame.data()),
        };
        trace!("Received CAN frame: ID=0x{:X}, data={:02X?}", raw.id, raw.data());
        Ok(Some(raw))
    }
}
