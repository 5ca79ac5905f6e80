//! Init service control.

use std::sync::Arc;

use tracing::debug;

use super::{PLATFORM_TARGET, PlatformError, PropertyStore};

const CTL_START: &str = "ctl.start";
const CTL_STOP: &str = "ctl.stop";

/// Fire-and-forget requests to the platform service manager.
///
/// A successful return only means the request was delivered; callers observe
/// the outcome through the status file or service state property.
pub trait ServiceManager: Send + Sync {
    /// Asks init to start the service called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the request cannot be delivered.
    fn request_start(&self, name: &str) -> Result<(), PlatformError>;

    /// Asks init to stop the service called `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the request cannot be delivered.
    fn request_stop(&self, name: &str) -> Result<(), PlatformError>;
}

/// Service manager that writes the `ctl.start` / `ctl.stop` control
/// properties watched by init.
#[derive(Clone)]
pub struct InitServiceManager {
    properties: Arc<dyn PropertyStore>,
}

impl InitServiceManager {
    /// Builds a manager that writes control properties through `properties`.
    #[must_use]
    pub fn new(properties: Arc<dyn PropertyStore>) -> Self {
        Self { properties }
    }
}

impl ServiceManager for InitServiceManager {
    fn request_start(&self, name: &str) -> Result<(), PlatformError> {
        debug!(target: PLATFORM_TARGET, service = name, "requesting service start");
        self.properties.set(CTL_START, name)
    }

    fn request_stop(&self, name: &str) -> Result<(), PlatformError> {
        debug!(target: PLATFORM_TARGET, service = name, "requesting service stop");
        self.properties.set(CTL_STOP, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryProperties;

    #[test]
    fn requests_are_written_to_control_properties() {
        let properties = Arc::new(MemoryProperties::new());
        let manager = InitServiceManager::new(properties.clone());
        manager.request_start("nanowifi_start").expect("start request");
        manager.request_stop("wpa_supplicant").expect("stop request");
        assert_eq!(properties.get(CTL_START).as_deref(), Some("nanowifi_start"));
        assert_eq!(properties.get(CTL_STOP).as_deref(), Some("wpa_supplicant"));
    }
}
