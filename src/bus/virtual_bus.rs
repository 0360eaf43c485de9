//! In-process loopback bus.
//!
//! [`virtual_bus`] returns the two ends of a wire: the [`VirtualBus`] is handed
//! to a session, the [`VirtualBusPeer`] plays the motors. Used by the tests
//! and for dry runs without hardware.

use super::{CanBus, RawFrame};
use crate::error::BusError;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct VirtualBus {
    to_peer: Sender<RawFrame>,
    from_peer: Receiver<RawFrame>,
}

pub struct VirtualBusPeer {
    from_bus: Receiver<RawFrame>,
    to_bus: Sender<RawFrame>,
}

pub fn virtual_bus() -> (VirtualBus, VirtualBusPeer) {
    let (to_peer, from_bus) = unbounded();
    let (to_bus, from_peer) = unbounded();
    (
        VirtualBus { to_peer, from_peer },
        VirtualBusPeer { from_bus, to_bus },
    )
}

impl CanBus for VirtualBus {
    fn send(&self, frame: &RawFrame) -> Result<(), BusError> {
        self.to_peer.send(*frame).map_err(|_| BusError::Disconnected)
    }

    fn receive(&self, timeout: Duration) -> Result<Option<RawFrame>, BusError> {
        match self.from_peer.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(BusError::Disconnected),
        }
    }
}

impl VirtualBusPeer {
    /// Put a frame on the wire towards the session.
    pub fn inject(&self, frame: RawFrame) -> Result<(), BusError> {
        self.to_bus.send(frame).map_err(|_| BusError::Disconnected)
    }

    /// Next frame the session transmitted, waiting up to `timeout`.
    pub fn next_sent(&self, timeout: Duration) -> Option<RawFrame> {
        self.from_bus.recv_timeout(timeout).ok()
    }

    pub fn try_next_sent(&self) -> Option<RawFrame> {
        self.from_bus.try_recv().ok()
    }

    /// Answer every transmitted frame from a background thread.
    ///
    /// `respond` returns the reply for a frame, or `None` to stay silent.
    /// The thread ends when the session side of the bus is dropped.
    pub fn spawn_responder<F>(self, mut respond: F) -> JoinHandle<()>
    where
        F: FnMut(&RawFrame) -> Option<RawFrame> + Send + 'static,
    {
        thread::spawn(move || {
            for frame in self.from_bus.iter() {
                if let Some(reply) = respond(&frame) {
                    if self.to_bus.send(reply).is_err() {
                        break;
                    }
                }
            }
        })
    }
}
