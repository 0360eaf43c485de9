//! Session configuration.

use std::time::Duration;

pub const DEFAULT_INTERFACE: &str = "can0";
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(100);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Settings for [`Session`](crate::Session).
///
/// ```
/// use lk_motor_control::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig {
///     response_timeout: Duration::from_millis(200),
///     ..SessionConfig::default()
/// };
/// assert_eq!(config.interface, "can0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// SocketCAN interface name, used by [`Session::open_socketcan`](crate::Session::open_socketcan).
    pub interface: String,
    /// Default reply deadline for [`LkMotor`](crate::LkMotor) operations.
    pub response_timeout: Duration,
    /// How long the receive thread blocks on the bus before re-checking for shutdown.
    pub poll_interval: Duration,
}

impl SessionConfig {
    pub fn with_interface(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
            ..Self::default()
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.to_string(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
