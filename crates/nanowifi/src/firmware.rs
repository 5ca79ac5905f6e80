//! Firmware image selection through the driver's module parameter.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Arc;

use camino::Utf8PathBuf;
use nanowifi_config::{Config, FirmwareMode};
use thiserror::Error;
use tracing::{debug, error, info};

const FIRMWARE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::firmware");

/// Errors raised while publishing a firmware path.
#[derive(Debug, Error)]
pub enum FirmwareError {
    /// The module parameter could not be opened for writing.
    #[error("cannot open firmware parameter '{path}': {source}")]
    Open {
        /// Parameter path.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// Writing the path failed.
    #[error("cannot write firmware parameter '{path}': {source}")]
    Write {
        /// Parameter path.
        path: Utf8PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// The kernel accepted fewer bytes than offered.
    #[error("short write to firmware parameter '{path}': {written} of {expected} bytes")]
    ShortWrite {
        /// Parameter path.
        path: Utf8PathBuf,
        /// Bytes accepted.
        written: usize,
        /// Bytes offered.
        expected: usize,
    },
}

/// Chooses and publishes the firmware image for a radio role.
pub struct FirmwareSelector {
    config: Arc<Config>,
}

impl FirmwareSelector {
    /// Builds a selector over the configured firmware paths.
    #[must_use]
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Configured firmware path for `mode`, or `None` when the platform
    /// does not need a reload for that role.
    #[must_use]
    pub fn path_for(&self, mode: FirmwareMode) -> Option<&str> {
        self.config.firmware_override(mode)
    }

    /// Like [`Self::path_for`], taking the numeric selector used by the
    /// framework. Unknown selectors have no path.
    #[must_use]
    pub fn path_for_raw(&self, selector: i32) -> Option<&str> {
        FirmwareMode::from_raw(selector).and_then(|mode| self.path_for(mode))
    }

    /// Writes `path` to the driver's firmware parameter.
    ///
    /// `None` and empty paths succeed without touching the parameter. The
    /// parameter is never created; it must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`FirmwareError`] when the parameter cannot be opened or the
    /// full path, including its terminating NUL, is not written in one go.
    pub fn apply(&self, path: Option<&str>) -> Result<(), FirmwareError> {
        let Some(path) = path.filter(|path| !path.is_empty()) else {
            debug!(target: FIRMWARE_TARGET, "no firmware path to apply");
            return Ok(());
        };
        let param = &self.config.fw_path_param;
        let mut file = OpenOptions::new()
            .write(true)
            .open(param)
            .map_err(|source| {
                error!(
                    target: FIRMWARE_TARGET,
                    param = %param,
                    error = %source,
                    "cannot open firmware parameter"
                );
                FirmwareError::Open {
                    path: param.clone(),
                    source,
                }
            })?;

        let mut payload = Vec::with_capacity(path.len() + 1);
        payload.extend_from_slice(path.as_bytes());
        payload.push(0);
        let written = file.write(&payload).map_err(|source| FirmwareError::Write {
            path: param.clone(),
            source,
        })?;
        if written != payload.len() {
            return Err(FirmwareError::ShortWrite {
                path: param.clone(),
                written,
                expected: payload.len(),
            });
        }
        info!(target: FIRMWARE_TARGET, firmware = path, "firmware path applied");
        Ok(())
    }
}
