//! Supplicant daemon start/stop.
//!
//! The supplicant runs as an init service. Starting it provisions the
//! configuration file, clears stale client sockets and then polls the init
//! state property until the service reports `running`.

use std::sync::Arc;
use std::time::Duration;

use nanowifi_config::Config;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::control::ControlTransport;
use crate::platform::{PropertyStore, ServiceManager, ServiceStateProbe, Sleeper};
use crate::poll::{POLL_STEP, PollSchedule, Probe};
use crate::provision::{ProvisionError, Provisioner};
use crate::status::duration_ms;

const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");

const STATE_RUNNING: &str = "running";
const STATE_STOPPED: &str = "stopped";

/// Probes of the state property after a start request.
const START_ATTEMPTS: u32 = 200;
/// Probes of the state property after a stop request.
const STOP_ATTEMPTS: u32 = 50;

/// Errors raised while starting or stopping the supplicant.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The configuration file could not be provisioned; the daemon was not
    /// started.
    #[error("supplicant will not be enabled: {source}")]
    Provision {
        /// Provisioning failure.
        #[from]
        source: ProvisionError,
    },
    /// The service reported `stopped` after the start request was issued.
    #[error("service '{service}' stopped immediately after starting")]
    CrashedOnStart {
        /// Supplicant service name.
        service: String,
    },
    /// The service never reported `running`.
    #[error("service '{service}' did not report running within {timeout_ms} ms")]
    StartTimeout {
        /// Supplicant service name.
        service: String,
        /// Budget that elapsed.
        timeout_ms: u64,
    },
    /// The service never reported `stopped`.
    #[error("service '{service}' did not report stopped within {timeout_ms} ms")]
    StopTimeout {
        /// Supplicant service name.
        service: String,
        /// Budget that elapsed.
        timeout_ms: u64,
    },
}

/// Starts and stops the supplicant service.
pub struct DaemonLifecycle {
    config: Arc<Config>,
    properties: Arc<dyn PropertyStore>,
    services: Arc<dyn ServiceManager>,
    probe: Box<dyn ServiceStateProbe>,
    sleeper: Arc<dyn Sleeper>,
}

impl DaemonLifecycle {
    /// Builds a lifecycle watching the configured state property through
    /// `probe`.
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        properties: Arc<dyn PropertyStore>,
        services: Arc<dyn ServiceManager>,
        probe: Box<dyn ServiceStateProbe>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config,
            properties,
            services,
            probe,
            sleeper,
        }
    }

    /// Whether the state property currently reads `running`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state_is(STATE_RUNNING)
    }

    /// Starts the supplicant unless it is already running.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Provision`] when the configuration file cannot
    /// be created, [`DaemonError::CrashedOnStart`] when the service exits
    /// right after starting, and [`DaemonError::StartTimeout`] when it never
    /// reports `running`.
    pub fn start(
        &mut self,
        provisioner: &Provisioner,
        transport: &dyn ControlTransport,
    ) -> Result<(), DaemonError> {
        if self.is_running() {
            info!(target: DAEMON_TARGET, "supplicant already running");
            return Ok(());
        }

        if let Err(source) = provisioner.ensure_config() {
            error!(
                target: DAEMON_TARGET,
                error = %source,
                "supplicant will not be enabled"
            );
            return Err(DaemonError::Provision { source });
        }

        transport.cleanup();

        let service = self.config.daemon_service.clone();
        let key = self.config.daemon_state_property.clone();
        self.probe.arm(&key);
        info!(target: DAEMON_TARGET, service = %service, "starting supplicant");
        if let Err(error) = self.services.request_start(&service) {
            warn!(
                target: DAEMON_TARGET,
                service = %service,
                error = %error,
                "service start request was not delivered"
            );
        }
        self.sleeper.yield_now();

        let schedule = PollSchedule::attempts(POLL_STEP, START_ATTEMPTS);
        let probe = &mut self.probe;
        let outcome = schedule.run(self.sleeper.as_ref(), || {
            let observation = probe.observe(&key);
            match observation.value.as_deref() {
                Some(STATE_RUNNING) => Probe::Ready(true),
                Some(STATE_STOPPED) if observation.changed => Probe::Ready(false),
                _ => Probe::Pending,
            }
        });

        match outcome {
            Some(true) => {
                info!(target: DAEMON_TARGET, service = %service, "supplicant running");
                Ok(())
            }
            Some(false) => {
                error!(target: DAEMON_TARGET, service = %service, "supplicant exited during start-up");
                Err(DaemonError::CrashedOnStart { service })
            }
            None => {
                error!(target: DAEMON_TARGET, service = %service, "supplicant start timed out");
                Err(DaemonError::StartTimeout {
                    service,
                    timeout_ms: budget_ms(schedule.budget()),
                })
            }
        }
    }

    /// Stops the supplicant unless it already reports `stopped`.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::StopTimeout`] when the service does not report
    /// `stopped` in time.
    pub fn stop(&mut self) -> Result<(), DaemonError> {
        if self.state_is(STATE_STOPPED) {
            info!(target: DAEMON_TARGET, "supplicant already stopped");
            return Ok(());
        }

        let service = self.config.daemon_service.clone();
        info!(target: DAEMON_TARGET, service = %service, "stopping supplicant");
        if let Err(error) = self.services.request_stop(&service) {
            warn!(
                target: DAEMON_TARGET,
                service = %service,
                error = %error,
                "service stop request was not delivered"
            );
        }
        self.sleeper.yield_now();

        let schedule = PollSchedule::attempts(POLL_STEP, STOP_ATTEMPTS);
        let stopped = schedule.run(self.sleeper.as_ref(), || {
            if self.state_is(STATE_STOPPED) {
                Probe::Ready(())
            } else {
                Probe::Pending
            }
        });

        stopped.ok_or_else(|| {
            error!(target: DAEMON_TARGET, service = %service, "supplicant stop timed out");
            DaemonError::StopTimeout {
                service,
                timeout_ms: budget_ms(schedule.budget()),
            }
        })
    }

    fn state_is(&self, expected: &str) -> bool {
        self.properties
            .get(&self.config.daemon_state_property)
            .is_some_and(|value| value == expected)
    }
}

/// Wall-clock span covered by a schedule, counting the final probe.
fn budget_ms(budget: Duration) -> u64 {
    duration_ms(budget.saturating_add(POLL_STEP))
}
