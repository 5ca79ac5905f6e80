//! One controller instance tying the driver, supplicant and control
//! channel together.

use std::sync::Arc;

use nanowifi_config::{Config, FirmwareMode};
use thiserror::Error;
use tracing::{info, warn};

use crate::control::{
    ChannelError, CommandError, ControlChannel, ControlTransport, UnixControlTransport,
};
use crate::daemon::{DaemonError, DaemonLifecycle};
use crate::driver::{DriverError, DriverLifecycle};
use crate::firmware::{FirmwareError, FirmwareSelector};
use crate::platform::{
    InitServiceManager, PollingStateProbe, PropertySerials, PropertyStore, SerialStateProbe,
    ServiceManager, ServiceStateProbe, Sleeper, ThreadSleeper,
};
use crate::provision::{ProvisionError, Provisioner};
use crate::status::DriverStatus;

const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Command after which the driver is reloaded (resume).
const DRIVER_START_DIRECTIVE: &str = "DRIVER START";
/// Command after which the driver is unloaded (suspend).
const DRIVER_STOP_DIRECTIVE: &str = "DRIVER STOP";

/// Errors surfaced by [`WifiSession`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A driver transition failed.
    #[error(transparent)]
    Driver(#[from] DriverError),
    /// Starting or stopping the supplicant failed.
    #[error(transparent)]
    Daemon(#[from] DaemonError),
    /// The control connections could not be established.
    #[error(transparent)]
    Channel(#[from] ChannelError),
    /// A supplicant file could not be provisioned.
    #[error(transparent)]
    Provision(#[from] ProvisionError),
    /// The firmware path could not be applied.
    #[error(transparent)]
    Firmware(#[from] FirmwareError),
}

/// Assembles a [`WifiSession`] from its collaborators.
pub struct SessionBuilder {
    config: Arc<Config>,
    properties: Arc<dyn PropertyStore>,
    serials: Option<Arc<dyn PropertySerials>>,
    services: Option<Arc<dyn ServiceManager>>,
    transport: Option<Arc<dyn ControlTransport>>,
    sleeper: Option<Arc<dyn Sleeper>>,
}

impl SessionBuilder {
    /// Supplies change counters so supplicant crashes during start-up are
    /// detected immediately.
    ///
    /// Serial support is opt-in even when the property store passed to
    /// [`WifiSession::builder`] also implements [`PropertySerials`]. Without
    /// this call the session polls the supplicant state and only a timeout
    /// ends a failed start.
    #[must_use]
    pub fn with_serials(mut self, serials: Arc<dyn PropertySerials>) -> Self {
        self.serials = Some(serials);
        self
    }

    /// Overrides the service manager. Defaults to [`InitServiceManager`]
    /// over the session's property store.
    #[must_use]
    pub fn with_services(mut self, services: Arc<dyn ServiceManager>) -> Self {
        self.services = Some(services);
        self
    }

    /// Overrides the control transport. Defaults to
    /// [`UnixControlTransport`].
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn ControlTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the sleeper used by every wait. Defaults to
    /// [`ThreadSleeper`].
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Builds the session.
    #[must_use]
    pub fn build(self) -> WifiSession {
        let Self {
            config,
            properties,
            serials,
            services,
            transport,
            sleeper,
        } = self;
        let services = services
            .unwrap_or_else(|| Arc::new(InitServiceManager::new(Arc::clone(&properties))));
        let transport = transport
            .unwrap_or_else(|| Arc::new(UnixControlTransport::from_config(&config)));
        let sleeper = sleeper.unwrap_or_else(|| Arc::new(ThreadSleeper));
        let probe: Box<dyn ServiceStateProbe> = match serials {
            Some(serials) => Box::new(SerialStateProbe::new(serials)),
            None => Box::new(PollingStateProbe::new(Arc::clone(&properties))),
        };

        WifiSession {
            driver: DriverLifecycle::new(
                Arc::clone(&config),
                Arc::clone(&properties),
                Arc::clone(&services),
                Arc::clone(&sleeper),
            ),
            daemon: DaemonLifecycle::new(
                Arc::clone(&config),
                Arc::clone(&properties),
                services,
                probe,
                Arc::clone(&sleeper),
            ),
            channel: ControlChannel::new(
                Arc::clone(&config),
                properties,
                Arc::clone(&transport),
                sleeper,
            ),
            provisioner: Provisioner::from_config(&config),
            firmware: FirmwareSelector::new(Arc::clone(&config)),
            transport,
            config,
        }
    }
}

/// Controller for one wireless interface.
///
/// Sessions are not shared between threads; callers that need concurrency
/// must serialise access themselves.
pub struct WifiSession {
    config: Arc<Config>,
    driver: DriverLifecycle,
    daemon: DaemonLifecycle,
    channel: ControlChannel,
    provisioner: Provisioner,
    firmware: FirmwareSelector,
    transport: Arc<dyn ControlTransport>,
}

impl WifiSession {
    /// Starts building a session over `properties`.
    #[must_use]
    pub fn builder(config: Config, properties: Arc<dyn PropertyStore>) -> SessionBuilder {
        SessionBuilder {
            config: Arc::new(config),
            properties,
            serials: None,
            services: None,
            transport: None,
            sleeper: None,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current driver status.
    pub fn status(&mut self) -> DriverStatus {
        self.driver.status()
    }

    /// Reason published alongside the most recent `error` status.
    #[must_use]
    pub fn last_error(&self) -> &str {
        self.driver.last_error()
    }

    /// Interface recorded by the last successful driver load.
    #[must_use]
    pub fn interface(&self) -> Option<&str> {
        self.driver.interface()
    }

    /// See [`DriverLifecycle::is_loaded`].
    pub fn is_driver_loaded(&mut self) -> bool {
        self.driver.is_loaded()
    }

    /// See [`DriverLifecycle::load`].
    ///
    /// # Errors
    ///
    /// Propagates [`DriverError`].
    pub fn load_driver(&mut self) -> Result<(), SessionError> {
        Ok(self.driver.load()?)
    }

    /// See [`DriverLifecycle::unload`].
    ///
    /// # Errors
    ///
    /// Propagates [`DriverError`].
    pub fn unload_driver(&mut self) -> Result<(), SessionError> {
        Ok(self.driver.unload()?)
    }

    /// Direct access to the driver lifecycle for auxiliary transitions.
    pub fn driver_mut(&mut self) -> &mut DriverLifecycle {
        &mut self.driver
    }

    /// See [`DaemonLifecycle::start`].
    ///
    /// # Errors
    ///
    /// Propagates [`DaemonError`].
    pub fn start_daemon(&mut self) -> Result<(), SessionError> {
        Ok(self
            .daemon
            .start(&self.provisioner, self.transport.as_ref())?)
    }

    /// See [`DaemonLifecycle::stop`].
    ///
    /// # Errors
    ///
    /// Propagates [`DaemonError`].
    pub fn stop_daemon(&mut self) -> Result<(), SessionError> {
        Ok(self.daemon.stop()?)
    }

    /// Whether the supplicant reports `running`.
    #[must_use]
    pub fn is_daemon_running(&self) -> bool {
        self.daemon.is_running()
    }

    /// Connects to the supplicant on the interface recorded by the last
    /// driver load.
    ///
    /// # Errors
    ///
    /// Propagates [`ChannelError`].
    pub fn connect(&mut self) -> Result<(), SessionError> {
        Ok(self.channel.connect(self.driver.interface())?)
    }

    /// Closes the control connections.
    pub fn close(&mut self) {
        self.channel.close();
    }

    /// Whether the control connections are open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Sends `command` over the control channel, then applies any driver
    /// directive it carries.
    ///
    /// Once the exchange has completed, whatever its outcome, the exact
    /// command `DRIVER START` loads the driver and `DRIVER STOP` unloads it.
    ///
    /// # Errors
    ///
    /// See [`ControlChannel::send`].
    pub fn send(&mut self, command: &str, reply: &mut [u8]) -> Result<usize, CommandError> {
        let result = self.channel.send(command, reply);
        if !matches!(result, Err(CommandError::NotConnected)) {
            self.apply_driver_directive(command);
        }
        result
    }

    /// Like [`Self::send`] with an internal reply buffer.
    ///
    /// # Errors
    ///
    /// See [`ControlChannel::send`].
    pub fn command(&mut self, command: &str) -> Result<String, CommandError> {
        let result = self.channel.command(command);
        if !matches!(result, Err(CommandError::NotConnected)) {
            self.apply_driver_directive(command);
        }
        result
    }

    /// See [`ControlChannel::wait_event`].
    pub fn wait_event(&mut self, buf: &mut [u8]) -> usize {
        self.channel.wait_event(buf)
    }

    /// See [`ControlChannel::next_event`].
    pub fn next_event(&mut self) -> String {
        self.channel.next_event()
    }

    /// See [`Provisioner::ensure_config`].
    ///
    /// # Errors
    ///
    /// Propagates [`ProvisionError`].
    pub fn ensure_config(&self) -> Result<(), SessionError> {
        Ok(self.provisioner.ensure_config()?)
    }

    /// See [`Provisioner::ensure_entropy_file`].
    ///
    /// # Errors
    ///
    /// Propagates [`ProvisionError`].
    pub fn ensure_entropy_file(&self) -> Result<(), SessionError> {
        Ok(self.provisioner.ensure_entropy_file()?)
    }

    /// Configured firmware path for `mode`.
    #[must_use]
    pub fn firmware_path(&self, mode: FirmwareMode) -> Option<&str> {
        self.firmware.path_for(mode)
    }

    /// Publishes `path` through the driver's firmware parameter.
    ///
    /// # Errors
    ///
    /// Propagates [`FirmwareError`].
    pub fn apply_firmware_path(&self, path: Option<&str>) -> Result<(), SessionError> {
        Ok(self.firmware.apply(path)?)
    }

    /// Loads the driver, seeds the entropy file, starts the supplicant and
    /// connects to it.
    ///
    /// Each step runs only when the previous one succeeded.
    ///
    /// # Errors
    ///
    /// Returns the first step's failure.
    pub fn bring_up(&mut self) -> Result<(), SessionError> {
        self.load_driver()?;
        self.ensure_entropy_file()?;
        self.start_daemon()?;
        self.connect()?;
        info!(target: SESSION_TARGET, interface = ?self.interface(), "wireless up");
        Ok(())
    }

    /// Closes the control channel, stops the supplicant and unloads the
    /// driver.
    ///
    /// Every step runs even when an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered.
    pub fn tear_down(&mut self) -> Result<(), SessionError> {
        self.close();
        let daemon = self.stop_daemon();
        let driver = self.unload_driver();
        if let Err(error) = &daemon {
            warn!(target: SESSION_TARGET, error = %error, "supplicant did not stop cleanly");
        }
        daemon.and(driver)
    }

    fn apply_driver_directive(&mut self, command: &str) {
        let outcome = match command {
            DRIVER_START_DIRECTIVE => {
                info!(target: SESSION_TARGET, "loading driver after resume");
                self.driver.load()
            }
            DRIVER_STOP_DIRECTIVE => {
                info!(target: SESSION_TARGET, "unloading driver before suspend");
                self.driver.unload()
            }
            _ => return,
        };
        if let Err(error) = outcome {
            warn!(
                target: SESSION_TARGET,
                command,
                error = %error,
                "driver directive did not complete"
            );
        }
    }
}
