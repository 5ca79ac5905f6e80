//! Lifecycle control for a loadable wireless driver and its supplicant.
//!
//! The crate drives the platform's init services to load and unload the
//! wireless driver, tracks the state the driver scripts publish in a status
//! file, starts and stops the supplicant daemon, and speaks the supplicant's
//! datagram control protocol. Every platform interaction sits behind a narrow
//! trait in [`platform`] so the state machines can be exercised against
//! in-memory doubles.

pub mod control;
pub mod daemon;
pub mod driver;
pub mod firmware;
pub mod platform;
pub mod poll;
pub mod provision;
pub mod session;
pub mod status;
pub mod telemetry;

pub use control::{
    COMMAND_REPLY_CAPACITY, ChannelError, CommandError, ControlChannel, ControlConnection,
    ControlTransport, EVENT_BUFFER_CAPACITY, TERMINATING_EVENT, TransportError,
    UnixControlTransport,
};
pub use daemon::{DaemonError, DaemonLifecycle};
pub use driver::{DriverError, DriverLifecycle};
pub use firmware::{FirmwareError, FirmwareSelector};
pub use platform::{
    AndroidProperties, InitServiceManager, MemoryProperties, PlatformError, PollingStateProbe,
    PropertySerials, PropertySnapshot, PropertyStore, SerialStateProbe, ServiceManager,
    ServiceObservation, ServiceStateProbe, Sleeper, ThreadSleeper,
};
pub use poll::{POLL_STEP, PollSchedule, Probe};
pub use provision::{ENTROPY_SEED, FileOwnership, ProvisionError, Provisioner};
pub use session::{SessionBuilder, SessionError, WifiSession};
pub use status::{DriverStatus, StatusError, StatusReader, status_to_text};

pub use nanowifi_config::{Config, FirmwareMode, LogFormat};

#[cfg(test)]
mod tests;
