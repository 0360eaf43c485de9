//! Transport session: owns the bus, correlates replies to requests.
//!
//! A background thread drains the bus and hands each decoded reply to the
//! caller waiting on the same `(motor, opcode)` pair. Callers block on a
//! one-shot channel until the reply arrives, the deadline passes, or the
//! session closes.

use crate::bus::{CanBus, RawFrame, SocketCanBus};
use crate::codec::{self, CommandParams, TelemetryFrame};
use crate::config::SessionConfig;
use crate::error::{BusError, Error, Result};
use crate::protocol::{MotorId, Opcode};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

type PendingKey = (MotorId, u8);

struct PendingRequest {
    token: u64,
    reply: Sender<Result<TelemetryFrame>>,
}

struct Shared {
    bus: Box<dyn CanBus>,
    pending: Mutex<HashMap<PendingKey, PendingRequest>>,
    closed: AtomicBool,
    next_token: AtomicU64,
}

impl Shared {
    fn dispatch(&self, frame: &RawFrame) {
        let decoded = codec::decode(frame);
        let key = match &decoded {
            Ok(telemetry) => Some((telemetry.motor_id, telemetry.opcode.code())),
            Err(_) => codec::reply_key(frame),
        };
        let waiter = key.and_then(|key| self.pending.lock().remove(&key));

        match (waiter, decoded) {
            (Some(request), decoded) => {
                // the waiter may have given up already
                let _ = request.reply.send(decoded.map_err(Error::from));
            }
            (None, Ok(telemetry)) => {
                debug!(
                    "Dropping unsolicited reply 0x{:02X} from motor {}",
                    telemetry.opcode.code(),
                    telemetry.motor_id
                );
            }
            (None, Err(e)) => {
                warn!("Dropping frame ID=0x{:X} {:02X?}: {}", frame.id, frame.data(), e);
            }
        }
    }

    /// Remove our own registration. `false` if a reply already took it.
    fn withdraw(&self, key: &PendingKey, token: u64) -> bool {
        let mut pending = self.pending.lock();
        match pending.get(key) {
            Some(request) if request.token == token => {
                pending.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Mark closed and fail every waiter. Returns `false` if already closed.
    fn shutdown(&self) -> bool {
        let waiters: Vec<PendingRequest> = {
            let mut pending = self.pending.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return false;
            }
            pending.drain().map(|(_, request)| request).collect()
        };
        for request in waiters {
            let _ = request.reply.send(Err(Error::SessionClosed));
        }
        true
    }
}

/// Receive errors in a row after which the bus is treated as gone.
pub const MAX_CONSECUTIVE_RECEIVE_ERRORS: u32 = 10;

fn receive_loop(shared: Arc<Shared>, poll_interval: Duration) {
    let mut consecutive_errors = 0u32;
    while !shared.closed.load(Ordering::Acquire) {
        match shared.bus.receive(poll_interval) {
            Ok(Some(frame)) => {
                consecutive_errors = 0;
                trace!("RX ID=0x{:X} {:02X?}", frame.id, frame.data());
                shared.dispatch(&frame);
            }
            Ok(None) => consecutive_errors = 0,
            Err(BusError::Disconnected) => {
                error!("CAN bus disconnected, closing session");
                shared.shutdown();
                break;
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= MAX_CONSECUTIVE_RECEIVE_ERRORS {
                    error!("CAN receive failed {} times in a row ({}), closing session", consecutive_errors, e);
                    shared.shutdown();
                    break;
                }
                warn!("CAN receive error ({}/{}): {}", consecutive_errors, MAX_CONSECUTIVE_RECEIVE_ERRORS, e);
                thread::sleep(poll_interval);
            }
        }
    }
    debug!("Receive thread stopped");
}

/// One open CAN bus shared by every motor on it.
///
/// Wrap it in an `Arc` to hand it to several [`LkMotor`](crate::LkMotor)s.
pub struct Session {
    shared: Arc<Shared>,
    config: SessionConfig,
    rx_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Take ownership of `bus` and start the receive thread.
    pub fn open<B: CanBus + 'static>(bus: B, config: SessionConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            bus: Box::new(bus),
            pending: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            next_token: AtomicU64::new(0),
        });

        let rx_shared = Arc::clone(&shared);
        let poll_interval = config.poll_interval;
        let handle = thread::Builder::new()
            .name("lk-can-rx".to_string())
            .spawn(move || receive_loop(rx_shared, poll_interval))
            .map_err(BusError::from)?;

        debug!("Session opened (poll interval {:?})", poll_interval);
        Ok(Self {
            shared,
            config,
            rx_thread: Mutex::new(Some(handle)),
        })
    }

    /// Open `config.interface` through SocketCAN.
    pub fn open_socketcan(config: SessionConfig) -> Result<Self> {
        let bus = SocketCanBus::open(&config.interface)?;
        Self::open(bus, config)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Number of requests currently waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Transmit a command and wait for the motor's reply.
    ///
    /// Only one request per `(motor, opcode)` may be in flight; a second one
    /// fails with [`Error::RequestConflict`] and leaves the first untouched.
    pub fn send_command(
        &self,
        motor_id: MotorId,
        opcode: Opcode,
        params: &CommandParams,
        timeout: Duration,
    ) -> Result<TelemetryFrame> {
        let frame = codec::encode(motor_id, opcode, params)?;
        let key = (motor_id, opcode.reply_opcode().code());
        let token = self.shared.next_token.fetch_add(1, Ordering::Relaxed);
        let (reply, waiter) = bounded(1);

        {
            let mut pending = self.shared.pending.lock();
            if self.is_closed() {
                return Err(Error::SessionClosed);
            }
            match pending.entry(key) {
                Entry::Occupied(_) => {
                    return Err(Error::RequestConflict {
                        motor_id: motor_id.get(),
                        opcode: opcode.code(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(PendingRequest { token, reply });
                }
            }
        }

        if let Err(e) = self.shared.bus.send(&frame.to_raw()) {
            self.shared.withdraw(&key, token);
            return Err(e.into());
        }
        trace!("TX motor {} {:02X?}", motor_id, frame.payload);

        match waiter.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                if self.shared.withdraw(&key, token) {
                    debug!("Motor {} did not answer 0x{:02X} within {:?}", motor_id, opcode.code(), timeout);
                    return Err(Error::Timeout {
                        motor_id: motor_id.get(),
                        opcode: opcode.code(),
                    });
                }
                // resolved right at the deadline; the reply is on its way
                waiter.recv().unwrap_or(Err(Error::SessionClosed))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::SessionClosed),
        }
    }

    /// Transmit without registering for a reply, for streamed set-points.
    /// Any reply is dropped by the receive thread.
    ///
    /// Fails with [`Error::RequestConflict`] while a [`send_command`] for the
    /// same `(motor, opcode)` is waiting.
    ///
    /// [`send_command`]: Session::send_command
    pub fn send_no_reply(&self, motor_id: MotorId, opcode: Opcode, params: &CommandParams) -> Result<()> {
        let frame = codec::encode(motor_id, opcode, params)?;
        let key = (motor_id, opcode.reply_opcode().code());

        // held across the send so no request can register in between
        let pending = self.shared.pending.lock();
        if self.is_closed() {
            return Err(Error::SessionClosed);
        }
        if pending.contains_key(&key) {
            return Err(Error::RequestConflict {
                motor_id: motor_id.get(),
                opcode: opcode.code(),
            });
        }
        self.shared.bus.send(&frame.to_raw())?;
        drop(pending);

        trace!("TX (no reply) motor {} {:02X?}", motor_id, frame.payload);
        Ok(())
    }

    /// Fail every outstanding request with [`Error::SessionClosed`] and stop
    /// the receive thread. Safe to call more than once.
    pub fn close(&self) {
        if self.shared.shutdown() {
            debug!("Session closed");
        }
        if let Some(handle) = self.rx_thread.lock().take() {
            if handle.join().is_err() {
                error!("Receive thread panicked");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
