//! Shared configuration for the nanowifi driver and supplicant controller.
//!
//! Every path, service name, property key and timeout the controller touches
//! is declared here so deployments can relocate the driver status file or the
//! supplicant sockets without rebuilding. Values are layered by
//! [`ortho_config`]: built-in defaults, then an optional TOML file
//! (`--config-path` / `NANOWIFI_CONFIG_PATH`), then `NANOWIFI_*` environment
//! variables, then command-line flags.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub mod defaults;
mod firmware;
mod logging;
mod socket;

pub use defaults::{default_interface, default_log_filter, default_log_format};
pub use firmware::FirmwareMode;
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{ControlEndpoint, SocketPreparationError, prepare_socket_directory};

use defaults as d;

/// Runtime configuration for the controller.
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "NANOWIFI")]
pub struct Config {
    /// Interface recorded by each driver load.
    #[ortho_config(default = d::default_interface())]
    pub interface: String,
    /// Driver status file.
    #[ortho_config(default = d::path(d::DEFAULT_STATUS_PATH))]
    pub status_path: Utf8PathBuf,
    /// Root of the per-interface liveness indicators.
    #[ortho_config(default = d::path(d::DEFAULT_LIVENESS_ROOT))]
    pub liveness_root: Utf8PathBuf,
    /// Property mirroring the logical driver state.
    #[ortho_config(default = d::DEFAULT_DRIVER_PROPERTY.to_string())]
    pub driver_property: String,
    /// Service that loads the driver.
    #[ortho_config(default = d::DEFAULT_DRIVER_LOAD_SERVICE.to_string())]
    pub driver_load_service: String,
    /// Service that unloads the driver.
    #[ortho_config(default = d::DEFAULT_DRIVER_UNLOAD_SERVICE.to_string())]
    pub driver_unload_service: String,
    /// Service that wakes the driver.
    #[ortho_config(default = d::DEFAULT_DRIVER_WAKE_SERVICE.to_string())]
    pub driver_wake_service: String,
    /// Service that puts the driver to sleep.
    #[ortho_config(default = d::DEFAULT_DRIVER_SLEEP_SERVICE.to_string())]
    pub driver_sleep_service: String,
    /// Service that enters soft AP mode.
    #[ortho_config(default = d::DEFAULT_SOFTAP_START_SERVICE.to_string())]
    pub softap_start_service: String,
    /// Service that leaves soft AP mode.
    #[ortho_config(default = d::DEFAULT_SOFTAP_STOP_SERVICE.to_string())]
    pub softap_stop_service: String,
    /// Supplicant service name.
    #[ortho_config(default = d::DEFAULT_DAEMON_SERVICE.to_string())]
    pub daemon_service: String,
    /// Init property reporting the supplicant state.
    #[ortho_config(default = d::DEFAULT_DAEMON_STATE_PROPERTY.to_string())]
    pub daemon_state_property: String,
    /// Per-interface control socket directory.
    #[ortho_config(default = d::path(d::DEFAULT_CTRL_IFACE_DIR))]
    pub ctrl_iface_dir: Utf8PathBuf,
    /// Directory of init-reserved sockets.
    #[ortho_config(default = d::path(d::DEFAULT_RESERVED_SOCKET_DIR))]
    pub reserved_socket_dir: Utf8PathBuf,
    /// Directory where client sockets are bound.
    #[ortho_config(default = d::path(d::DEFAULT_CLIENT_SOCKET_DIR))]
    pub client_socket_dir: Utf8PathBuf,
    /// Supplicant configuration template.
    #[ortho_config(default = d::path(d::DEFAULT_CONFIG_TEMPLATE))]
    pub config_template: Utf8PathBuf,
    /// Live supplicant configuration.
    #[ortho_config(default = d::path(d::DEFAULT_CONFIG_FILE))]
    pub config_file: Utf8PathBuf,
    /// Supplicant entropy seed.
    #[ortho_config(default = d::path(d::DEFAULT_ENTROPY_FILE))]
    pub entropy_file: Utf8PathBuf,
    /// Owner applied to provisioned files.
    #[ortho_config(default = d::DEFAULT_FILE_UID)]
    pub file_uid: u32,
    /// Group applied to provisioned files.
    #[ortho_config(default = d::DEFAULT_FILE_GID)]
    pub file_gid: u32,
    /// Permission bits applied to provisioned files.
    #[ortho_config(default = d::DEFAULT_FILE_MODE)]
    pub file_mode: u32,
    /// Kernel parameter receiving the firmware path.
    #[ortho_config(default = d::path(d::DEFAULT_FW_PATH_PARAM))]
    pub fw_path_param: Utf8PathBuf,
    /// Station firmware; empty for no override.
    #[ortho_config(default = String::new())]
    pub fw_path_sta: String,
    /// Access point firmware; empty for no override.
    #[ortho_config(default = String::new())]
    pub fw_path_ap: String,
    /// Peer-to-peer firmware; empty for no override.
    #[ortho_config(default = String::new())]
    pub fw_path_p2p: String,
    /// Driver load budget in milliseconds.
    #[ortho_config(default = d::DEFAULT_LOAD_TIMEOUT_MS)]
    pub load_timeout_ms: u64,
    /// Driver wake budget in milliseconds.
    #[ortho_config(default = d::DEFAULT_WAKE_TIMEOUT_MS)]
    pub wake_timeout_ms: u64,
    /// Driver sleep budget in milliseconds.
    #[ortho_config(default = d::DEFAULT_SLEEP_TIMEOUT_MS)]
    pub sleep_timeout_ms: u64,
    /// Driver unload budget in milliseconds.
    #[ortho_config(default = d::DEFAULT_UNLOAD_TIMEOUT_MS)]
    pub unload_timeout_ms: u64,
    /// Soft AP entry budget in milliseconds.
    #[ortho_config(default = d::DEFAULT_SOFTAP_START_TIMEOUT_MS)]
    pub softap_start_timeout_ms: u64,
    /// Soft AP exit budget in milliseconds.
    #[ortho_config(default = d::DEFAULT_SOFTAP_STOP_TIMEOUT_MS)]
    pub softap_stop_timeout_ms: u64,
    /// Control socket open budget in milliseconds.
    #[ortho_config(default = d::DEFAULT_SUPPLICANT_TIMEOUT_MS)]
    pub supplicant_timeout_ms: u64,
    /// Control request reply budget in milliseconds.
    #[ortho_config(default = d::DEFAULT_REQUEST_TIMEOUT_MS)]
    pub request_timeout_ms: u64,
    /// Tracing filter expression.
    #[ortho_config(default = d::default_log_filter_string())]
    pub log_filter: String,
    /// Tracing output format.
    #[ortho_config(default = d::default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: d::default_interface(),
            status_path: d::path(d::DEFAULT_STATUS_PATH),
            liveness_root: d::path(d::DEFAULT_LIVENESS_ROOT),
            driver_property: d::DEFAULT_DRIVER_PROPERTY.to_string(),
            driver_load_service: d::DEFAULT_DRIVER_LOAD_SERVICE.to_string(),
            driver_unload_service: d::DEFAULT_DRIVER_UNLOAD_SERVICE.to_string(),
            driver_wake_service: d::DEFAULT_DRIVER_WAKE_SERVICE.to_string(),
            driver_sleep_service: d::DEFAULT_DRIVER_SLEEP_SERVICE.to_string(),
            softap_start_service: d::DEFAULT_SOFTAP_START_SERVICE.to_string(),
            softap_stop_service: d::DEFAULT_SOFTAP_STOP_SERVICE.to_string(),
            daemon_service: d::DEFAULT_DAEMON_SERVICE.to_string(),
            daemon_state_property: d::DEFAULT_DAEMON_STATE_PROPERTY.to_string(),
            ctrl_iface_dir: d::path(d::DEFAULT_CTRL_IFACE_DIR),
            reserved_socket_dir: d::path(d::DEFAULT_RESERVED_SOCKET_DIR),
            client_socket_dir: d::path(d::DEFAULT_CLIENT_SOCKET_DIR),
            config_template: d::path(d::DEFAULT_CONFIG_TEMPLATE),
            config_file: d::path(d::DEFAULT_CONFIG_FILE),
            entropy_file: d::path(d::DEFAULT_ENTROPY_FILE),
            file_uid: d::DEFAULT_FILE_UID,
            file_gid: d::DEFAULT_FILE_GID,
            file_mode: d::DEFAULT_FILE_MODE,
            fw_path_param: d::path(d::DEFAULT_FW_PATH_PARAM),
            fw_path_sta: String::new(),
            fw_path_ap: String::new(),
            fw_path_p2p: String::new(),
            load_timeout_ms: d::DEFAULT_LOAD_TIMEOUT_MS,
            wake_timeout_ms: d::DEFAULT_WAKE_TIMEOUT_MS,
            sleep_timeout_ms: d::DEFAULT_SLEEP_TIMEOUT_MS,
            unload_timeout_ms: d::DEFAULT_UNLOAD_TIMEOUT_MS,
            softap_start_timeout_ms: d::DEFAULT_SOFTAP_START_TIMEOUT_MS,
            softap_stop_timeout_ms: d::DEFAULT_SOFTAP_STOP_TIMEOUT_MS,
            supplicant_timeout_ms: d::DEFAULT_SUPPLICANT_TIMEOUT_MS,
            request_timeout_ms: d::DEFAULT_REQUEST_TIMEOUT_MS,
            log_filter: d::default_log_filter_string(),
            log_format: d::default_log_format(),
        }
    }
}

impl Config {
    /// Interface recorded by each driver load.
    #[must_use]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Path of the driver status file.
    #[must_use]
    pub fn status_path(&self) -> &Utf8Path {
        &self.status_path
    }

    /// Liveness indicator for `interface`, present only while the driver runs.
    #[must_use]
    pub fn liveness_path(&self, interface: &str) -> Utf8PathBuf {
        self.liveness_root.join(interface).join("status")
    }

    /// Budget for loading the driver and leaving its shutdown state.
    #[must_use]
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms.saturating_add(self.wake_timeout_ms))
    }

    /// Budget for waking the driver.
    #[must_use]
    pub fn wake_timeout(&self) -> Duration {
        Duration::from_millis(self.wake_timeout_ms)
    }

    /// Budget for putting the driver to sleep.
    #[must_use]
    pub fn sleep_timeout(&self) -> Duration {
        Duration::from_millis(self.sleep_timeout_ms)
    }

    /// Budget for unloading the driver.
    #[must_use]
    pub fn unload_timeout(&self) -> Duration {
        Duration::from_millis(self.unload_timeout_ms)
    }

    /// Budget for entering soft AP mode.
    #[must_use]
    pub fn softap_start_timeout(&self) -> Duration {
        Duration::from_millis(self.softap_start_timeout_ms)
    }

    /// Budget for leaving soft AP mode.
    #[must_use]
    pub fn softap_stop_timeout(&self) -> Duration {
        Duration::from_millis(self.softap_stop_timeout_ms)
    }

    /// Budget for the control socket to accept a connection.
    #[must_use]
    pub fn supplicant_timeout(&self) -> Duration {
        Duration::from_millis(self.supplicant_timeout_ms)
    }

    /// Budget for a single control request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the configured log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the configured log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Firmware override configured for `mode`, if any.
    #[must_use]
    pub fn firmware_override(&self, mode: FirmwareMode) -> Option<&str> {
        let path = match mode {
            FirmwareMode::Station => &self.fw_path_sta,
            FirmwareMode::AccessPoint => &self.fw_path_ap,
            FirmwareMode::PeerToPeer => &self.fw_path_p2p,
        };
        Some(path.as_str()).filter(|path| !path.is_empty())
    }
}
