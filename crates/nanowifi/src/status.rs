//! Driver status file parsing and waiting.
//!
//! The driver start/stop scripts publish a single-line label describing the
//! driver state. When the label is `error` the following line carries a
//! human-readable reason.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::platform::Sleeper;
use crate::poll::{PollSchedule, Probe};

pub(crate) const STATUS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::status");

/// Bytes read for the status line, terminator included.
const STATUS_LINE_CAPACITY: usize = 64;
/// Bytes retained for the error detail line, terminator included.
const ERROR_DETAIL_CAPACITY: usize = 128;

/// Logical driver state as published in the status file.
///
/// Declaration order matches the numeric codes used by callers that pass
/// raw status values around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[repr(u8)]
pub enum DriverStatus {
    /// Modules are not loaded.
    #[strum(serialize = "unloaded")]
    Unloaded,
    /// Modules are loaded but the radio is in its shutdown state.
    #[strum(serialize = "sleeping")]
    Sleeping,
    /// Station mode is active.
    #[strum(serialize = "WiFi on")]
    On,
    /// Soft access point mode is active.
    #[strum(serialize = "Soft AP")]
    SoftAp,
    /// The scripts reported a failure; see [`StatusReader::last_error`].
    #[strum(serialize = "error")]
    Error,
    /// The status could not be determined.
    #[strum(serialize = "unknown")]
    Unknown,
}

impl DriverStatus {
    /// Label written by the driver scripts for this state.
    #[must_use]
    pub fn label(self) -> &'static str {
        self.into()
    }

    /// Maps a label onto a state by scanning the known labels in order.
    ///
    /// Anything that is not an exact match yields [`DriverStatus::Unknown`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        Self::iter()
            .find(|status| status.label() == label)
            .unwrap_or(Self::Unknown)
    }

    /// Maps a raw numeric code onto a state, clamping out-of-range codes to
    /// [`DriverStatus::Unknown`].
    #[must_use]
    pub fn from_raw(raw: u8) -> Self {
        Self::iter()
            .nth(usize::from(raw))
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for DriverStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.label())
    }
}

/// Returns the label for a raw status code; out-of-range codes map to
/// `"unknown"`.
#[must_use]
pub fn status_to_text(raw: u8) -> &'static str {
    DriverStatus::from_raw(raw).label()
}

/// Errors raised while reading the status file.
#[derive(Debug, Error)]
pub enum StatusError {
    /// The status file could not be opened or read.
    #[error("failed to read driver status '{path}': {source}")]
    Unreadable {
        /// Status file path.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
}

/// Reads the driver status file and waits for target states.
pub struct StatusReader {
    path: Utf8PathBuf,
    sleeper: Arc<dyn Sleeper>,
    last_error: String,
}

impl StatusReader {
    /// Creates a reader for the status file at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            path: path.into(),
            sleeper,
            last_error: String::new(),
        }
    }

    /// Path of the status file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Reason recorded by the most recent read that observed
    /// [`DriverStatus::Error`].
    ///
    /// The detail survives later reads until another error is observed.
    #[must_use]
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Reads the current status, degrading read failures to
    /// [`DriverStatus::Unknown`].
    pub fn read(&mut self) -> DriverStatus {
        match self.try_read() {
            Ok(status) => status,
            Err(error) => {
                warn!(target: STATUS_TARGET, error = %error, "driver status unavailable");
                DriverStatus::Unknown
            }
        }
    }

    /// Reads the current status.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::Unreadable`] when the file cannot be opened or
    /// its first line cannot be read.
    pub fn try_read(&mut self) -> Result<DriverStatus, StatusError> {
        let file = File::open(&self.path).map_err(|source| self.unreadable(source))?;
        let mut reader = BufReader::new(file);
        let line = read_bounded_line(&mut reader, STATUS_LINE_CAPACITY)
            .map_err(|source| self.unreadable(source))?;
        let status = parse_status_line(&line);

        if status == DriverStatus::Error {
            let detail = read_bounded_line(&mut reader, ERROR_DETAIL_CAPACITY).unwrap_or_default();
            self.last_error = String::from_utf8_lossy(strip_newline(&detail)).into_owned();
            debug!(
                target: STATUS_TARGET,
                detail = %self.last_error,
                "driver reported an error"
            );
        }
        Ok(status)
    }

    fn unreadable(&self, source: io::Error) -> StatusError {
        StatusError::Unreadable {
            path: self.path.clone(),
            source,
        }
    }

    /// Polls until the driver reports `target` or [`DriverStatus::Error`], or
    /// `timeout` elapses.
    ///
    /// Returns the last status observed, which equals `target` on success.
    pub fn wait_for(&mut self, target: DriverStatus, timeout: Duration) -> DriverStatus {
        debug!(
            target: STATUS_TARGET,
            expected = %target,
            timeout_ms = duration_ms(timeout),
            "waiting for driver status"
        );
        let sleeper = Arc::clone(&self.sleeper);
        let mut last = DriverStatus::Unknown;
        let settled = PollSchedule::with_budget(timeout).run(sleeper.as_ref(), || {
            last = self.read();
            if last == target || last == DriverStatus::Error {
                Probe::Ready(last)
            } else {
                Probe::Pending
            }
        });

        match settled {
            Some(DriverStatus::Error) if target != DriverStatus::Error => {
                error!(
                    target: STATUS_TARGET,
                    expected = %target,
                    detail = %self.last_error,
                    "driver reported an error while changing state"
                );
                DriverStatus::Error
            }
            Some(status) => status,
            None => {
                warn!(
                    target: STATUS_TARGET,
                    expected = %target,
                    observed = %last,
                    "timed out waiting for driver status"
                );
                last
            }
        }
    }
}

/// Reads at most `capacity - 1` bytes up to and including a newline.
fn read_bounded_line(reader: &mut impl BufRead, capacity: usize) -> io::Result<Vec<u8>> {
    let limit = u64::try_from(capacity.saturating_sub(1)).unwrap_or(u64::MAX);
    let mut line = Vec::new();
    reader.by_ref().take(limit).read_until(b'\n', &mut line)?;
    Ok(line)
}

fn strip_newline(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\n").unwrap_or(line)
}

fn parse_status_line(line: &[u8]) -> DriverStatus {
    let label = strip_newline(line);
    if label.is_empty() {
        return DriverStatus::Unknown;
    }
    DriverStatus::from_label(&String::from_utf8_lossy(label))
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
