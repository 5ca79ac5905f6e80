//! Driver load/unload state machine.
//!
//! The driver is loaded and unloaded by init services; this module issues the
//! requests, waits on the status file, and cross-checks the per-interface
//! liveness indicator before trusting a reported `WiFi on`.

use std::fs::File;
use std::sync::Arc;
use std::time::Duration;

use nanowifi_config::Config;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::platform::{PropertyStore, ServiceManager, Sleeper, set_verified};
use crate::status::{DriverStatus, StatusReader, duration_ms};

const DRIVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::driver");

/// Driver state property value written after a verified load.
const PROPERTY_LOADED: &str = "ok";
/// Driver state property value written when a load is rolled back.
const PROPERTY_UNLOADED: &str = "unloaded";

/// Errors raised by driver transitions.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The driver did not come up with a live interface; the load was rolled
    /// back.
    #[error("driver failed to start on {interface} (last status: {status})")]
    LoadFailed {
        /// Interface that was being brought up.
        interface: String,
        /// Status observed when the load was abandoned.
        status: DriverStatus,
    },
    /// The driver did not reach the expected state within its budget.
    #[error("driver did not reach '{expected}' within {timeout_ms} ms (last status: {observed})")]
    TransitionTimeout {
        /// State the transition was waiting for.
        expected: DriverStatus,
        /// Last state observed.
        observed: DriverStatus,
        /// Budget that elapsed.
        timeout_ms: u64,
    },
    /// The driver scripts reported an error during the transition.
    #[error("driver reported an error while moving to '{expected}': {detail}")]
    Reported {
        /// State the transition was waiting for.
        expected: DriverStatus,
        /// Detail line published by the driver scripts.
        detail: String,
    },
}

/// Drives the driver through its lifecycle.
pub struct DriverLifecycle {
    config: Arc<Config>,
    status: StatusReader,
    properties: Arc<dyn PropertyStore>,
    services: Arc<dyn ServiceManager>,
    interface: Option<String>,
}

impl DriverLifecycle {
    /// Builds a lifecycle reading the configured status file.
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        properties: Arc<dyn PropertyStore>,
        services: Arc<dyn ServiceManager>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let status = StatusReader::new(config.status_path(), sleeper);
        Self {
            config,
            status,
            properties,
            services,
            interface: None,
        }
    }

    /// Interface recorded by the last successful load.
    ///
    /// Cleared by a failed load and by every unload.
    #[must_use]
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Current driver status.
    pub fn status(&mut self) -> DriverStatus {
        self.status.read()
    }

    /// Reason published alongside the most recent `error` status.
    #[must_use]
    pub fn last_error(&self) -> &str {
        self.status.last_error()
    }

    /// Whether the driver reports `WiFi on` and the configured interface's
    /// liveness indicator exists.
    pub fn is_loaded(&mut self) -> bool {
        self.status.read() == DriverStatus::On && self.liveness_present(self.config.interface())
    }

    /// Loads the driver for the configured interface.
    ///
    /// A driver reporting `WiFi on` without a liveness indicator is a stale
    /// status left by an earlier session and is accepted as-is.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::LoadFailed`] when the interface never becomes
    /// live. The driver state property is reset and an unload is attempted
    /// before returning.
    pub fn load(&mut self) -> Result<(), DriverError> {
        let interface = self.config.interface().to_owned();
        self.interface = Some(interface.clone());
        let mut status = self.status.read();
        info!(
            target: DRIVER_TARGET,
            interface = %interface,
            status = %status,
            "loading driver"
        );

        if status == DriverStatus::On && !self.liveness_present(&interface) {
            warn!(
                target: DRIVER_TARGET,
                interface = %interface,
                "driver reports on without a live interface; treating status as stale"
            );
            return Ok(());
        }

        if matches!(status, DriverStatus::Unloaded | DriverStatus::Unknown) {
            let service = self.config.driver_load_service.clone();
            self.request_start(&service);
            status = self
                .status
                .wait_for(DriverStatus::On, self.config.load_timeout());
        }

        if self.liveness_present(&interface) {
            set_verified(
                self.properties.as_ref(),
                &self.config.driver_property,
                PROPERTY_LOADED,
            );
            info!(target: DRIVER_TARGET, interface = %interface, "driver loaded");
            return Ok(());
        }

        error!(
            target: DRIVER_TARGET,
            interface = %interface,
            status = %status,
            detail = %self.status.last_error(),
            "driver failed to start; rolling back"
        );
        set_verified(
            self.properties.as_ref(),
            &self.config.driver_property,
            PROPERTY_UNLOADED,
        );
        let service = self.config.driver_unload_service.clone();
        self.request_start(&service);
        self.status
            .wait_for(DriverStatus::Unloaded, self.config.unload_timeout());
        self.interface = None;
        Err(DriverError::LoadFailed { interface, status })
    }

    /// Unloads the driver.
    ///
    /// Succeeds without side effects when the driver is not reporting
    /// `WiFi on`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the driver does not report `unloaded`
    /// within the unload budget.
    pub fn unload(&mut self) -> Result<(), DriverError> {
        self.interface = None;
        let status = self.status.read();
        if status != DriverStatus::On {
            info!(target: DRIVER_TARGET, status = %status, "driver not running; nothing to unload");
            return Ok(());
        }
        let service = self.config.driver_unload_service.clone();
        let timeout = self.config.unload_timeout();
        self.transition(&service, DriverStatus::Unloaded, timeout)
    }

    /// Puts the radio into its shutdown state.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the driver does not report `sleeping` in
    /// time.
    pub fn sleep(&mut self) -> Result<(), DriverError> {
        let service = self.config.driver_sleep_service.clone();
        let timeout = self.config.sleep_timeout();
        self.transition(&service, DriverStatus::Sleeping, timeout)
    }

    /// Brings the radio out of its shutdown state.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the driver does not report `WiFi on` in
    /// time.
    pub fn wake(&mut self) -> Result<(), DriverError> {
        let service = self.config.driver_wake_service.clone();
        let timeout = self.config.wake_timeout();
        self.transition(&service, DriverStatus::On, timeout)
    }

    /// Switches the driver into soft access point mode.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the driver does not report `Soft AP` in
    /// time.
    pub fn start_soft_ap(&mut self) -> Result<(), DriverError> {
        let service = self.config.softap_start_service.clone();
        let timeout = self.config.softap_start_timeout();
        self.transition(&service, DriverStatus::SoftAp, timeout)
    }

    /// Leaves soft access point mode and returns to station mode.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError`] when the driver does not report `WiFi on` in
    /// time.
    pub fn stop_soft_ap(&mut self) -> Result<(), DriverError> {
        let service = self.config.softap_stop_service.clone();
        let timeout = self.config.softap_stop_timeout();
        self.transition(&service, DriverStatus::On, timeout)
    }

    fn transition(
        &mut self,
        service: &str,
        expected: DriverStatus,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        info!(target: DRIVER_TARGET, service, expected = %expected, "changing driver state");
        self.request_start(service);
        match self.status.wait_for(expected, timeout) {
            observed if observed == expected => Ok(()),
            DriverStatus::Error => Err(DriverError::Reported {
                expected,
                detail: self.status.last_error().to_owned(),
            }),
            observed => Err(DriverError::TransitionTimeout {
                expected,
                observed,
                timeout_ms: duration_ms(timeout),
            }),
        }
    }

    fn request_start(&self, service: &str) {
        if let Err(error) = self.services.request_start(service) {
            warn!(
                target: DRIVER_TARGET,
                service,
                error = %error,
                "service start request was not delivered"
            );
        }
    }

    fn liveness_present(&self, interface: &str) -> bool {
        File::open(self.config.liveness_path(interface)).is_ok()
    }
}
