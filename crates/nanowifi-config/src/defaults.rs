//! Built-in defaults matching the platform layout the driver scripts expect.

use camino::Utf8PathBuf;

/// Interface recorded by every successful driver load.
pub const DEFAULT_INTERFACE: &str = "wlan0";

/// Status file rewritten by the driver start/stop scripts.
pub const DEFAULT_STATUS_PATH: &str = "/data/misc/wifi/nano_driver_status";

/// Root of the per-interface procfs tree used as the liveness indicator.
pub const DEFAULT_LIVENESS_ROOT: &str = "/proc/driver";

/// Property mirroring the logical driver state.
pub const DEFAULT_DRIVER_PROPERTY: &str = "wlan.driver.status";

/// Init property reporting the supplicant service state.
pub const DEFAULT_DAEMON_STATE_PROPERTY: &str = "init.svc.wpa_supplicant";

/// Service that loads the driver modules.
pub const DEFAULT_DRIVER_LOAD_SERVICE: &str = "nanowifi_start";
/// Service that removes the driver modules.
pub const DEFAULT_DRIVER_UNLOAD_SERVICE: &str = "nanowifi_stop";
/// Service that brings the driver out of its shutdown state.
pub const DEFAULT_DRIVER_WAKE_SERVICE: &str = "nanowifi_wake";
/// Service that puts the driver into its shutdown state.
pub const DEFAULT_DRIVER_SLEEP_SERVICE: &str = "nanowifi_sleep";
/// Service that switches the driver into soft AP mode.
pub const DEFAULT_SOFTAP_START_SERVICE: &str = "nano_start_sap";
/// Service that leaves soft AP mode.
pub const DEFAULT_SOFTAP_STOP_SERVICE: &str = "nano_stop_sap";

/// Supplicant service name known to init.
pub const DEFAULT_DAEMON_SERVICE: &str = "wpa_supplicant";

/// Directory holding the supplicant's per-interface control sockets.
pub const DEFAULT_CTRL_IFACE_DIR: &str = "/data/misc/wifi/wpa_supplicant";

/// Directory holding init-reserved sockets used for bare endpoint names.
pub const DEFAULT_RESERVED_SOCKET_DIR: &str = "/dev/socket";

/// Directory in which client-side control sockets are bound.
pub const DEFAULT_CLIENT_SOCKET_DIR: &str = "/data/misc/wifi/sockets";

/// Template copied when the supplicant configuration is missing.
pub const DEFAULT_CONFIG_TEMPLATE: &str = "/system/etc/wifi/wpa_supplicant.conf";

/// Live supplicant configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "/data/misc/wifi/wpa_supplicant.conf";

/// Entropy seed consumed by the supplicant.
pub const DEFAULT_ENTROPY_FILE: &str = "/data/misc/wifi/entropy.bin";

/// Kernel module parameter accepting the firmware path.
pub const DEFAULT_FW_PATH_PARAM: &str = "/sys/module/wlan/parameters/fwpath";

/// Owner applied to provisioned files (`AID_SYSTEM`).
pub const DEFAULT_FILE_UID: u32 = 1000;

/// Group applied to provisioned files (`AID_WIFI`).
pub const DEFAULT_FILE_GID: u32 = 1010;

/// Permission bits applied to provisioned files.
pub const DEFAULT_FILE_MODE: u32 = 0o660;

/// Driver module loading budget (service `nanowifi_start`).
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 4_000;
/// Shutdown state exit budget (service `nanowifi_wake`).
pub const DEFAULT_WAKE_TIMEOUT_MS: u64 = 1_000;
/// Shutdown state entry budget (service `nanowifi_sleep`).
pub const DEFAULT_SLEEP_TIMEOUT_MS: u64 = 1_000;
/// Driver module removal budget (service `nanowifi_stop`).
pub const DEFAULT_UNLOAD_TIMEOUT_MS: u64 = 1_000;
/// Soft AP mode entry budget (service `nano_start_sap`).
pub const DEFAULT_SOFTAP_START_TIMEOUT_MS: u64 = 5_000;
/// Soft AP mode exit budget (service `nano_stop_sap`).
pub const DEFAULT_SOFTAP_STOP_TIMEOUT_MS: u64 = 1_500;
/// Budget for the supplicant control socket to appear.
pub const DEFAULT_SUPPLICANT_TIMEOUT_MS: u64 = 1_500;
/// Budget for a single control request to be answered.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Owned default interface name.
pub fn default_interface() -> String {
    DEFAULT_INTERFACE.to_string()
}

pub(crate) fn path(value: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(value)
}
