//! System property access.

use std::collections::HashMap;
use std::process::Command;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use super::{PLATFORM_TARGET, PlatformError};

/// Number of write-then-verify rounds attempted by [`set_verified`].
const VERIFY_ATTEMPTS: usize = 8;

/// Key/value system property store.
pub trait PropertyStore: Send + Sync {
    /// Reads `key`, returning `None` when the property is unset.
    fn get(&self, key: &str) -> Option<String>;

    /// Writes `value` to `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] when the store refuses the write.
    fn set(&self, key: &str, value: &str) -> Result<(), PlatformError>;
}

/// Property value together with its change counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySnapshot {
    /// Current value.
    pub value: String,
    /// Counter that advances on every write to the property.
    pub serial: u32,
}

/// Optional capability exposing per-property change counters.
pub trait PropertySerials: Send + Sync {
    /// Returns the value and change counter for `key`, if it exists.
    fn snapshot(&self, key: &str) -> Option<PropertySnapshot>;
}

/// Writes `value` to `key` and reads it back, retrying a bounded number of
/// times until the store reports the written value.
///
/// Returns `true` once the read-back matches.
pub fn set_verified(store: &dyn PropertyStore, key: &str, value: &str) -> bool {
    for attempt in 1..=VERIFY_ATTEMPTS {
        if let Err(error) = store.set(key, value) {
            debug!(
                target: PLATFORM_TARGET,
                key,
                attempt,
                error = %error,
                "property write failed"
            );
            continue;
        }
        if store.get(key).as_deref() == Some(value) {
            return true;
        }
    }
    warn!(
        target: PLATFORM_TARGET,
        key,
        value,
        attempts = VERIFY_ATTEMPTS,
        "property value did not stick"
    );
    false
}

/// In-process property store with change counters.
///
/// Every successful write bumps the property's serial, mirroring the
/// behaviour of the platform property area.
#[derive(Debug, Default)]
pub struct MemoryProperties {
    entries: Mutex<HashMap<String, PropertySnapshot>>,
}

impl MemoryProperties {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `entries`.
    #[must_use]
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::new();
        for (key, value) in entries {
            store.write(key, value);
        }
        store
    }

    fn write(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .entry(key.to_owned())
            .or_insert_with(|| PropertySnapshot {
                value: String::new(),
                serial: 0,
            });
        entry.value = value.to_owned();
        entry.serial = entry.serial.wrapping_add(1);
    }
}

impl PropertyStore for MemoryProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.snapshot(key).map(|snapshot| snapshot.value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PlatformError> {
        self.write(key, value);
        Ok(())
    }
}

impl PropertySerials for MemoryProperties {
    fn snapshot(&self, key: &str) -> Option<PropertySnapshot> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

/// Property store that shells out to the platform `getprop`/`setprop` tools.
#[derive(Debug, Clone)]
pub struct AndroidProperties {
    getprop: &'static str,
    setprop: &'static str,
}

impl Default for AndroidProperties {
    fn default() -> Self {
        Self {
            getprop: "getprop",
            setprop: "setprop",
        }
    }
}

impl PropertyStore for AndroidProperties {
    fn get(&self, key: &str) -> Option<String> {
        let output = match Command::new(self.getprop).arg(key).output() {
            Ok(output) => output,
            Err(error) => {
                warn!(
                    target: PLATFORM_TARGET,
                    key,
                    error = %error,
                    "failed to run getprop"
                );
                return None;
            }
        };
        if !output.status.success() {
            return None;
        }
        let value = String::from_utf8_lossy(&output.stdout).trim_end().to_owned();
        (!value.is_empty()).then_some(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PlatformError> {
        let status = Command::new(self.setprop)
            .arg(key)
            .arg(value)
            .status()
            .map_err(|source| PlatformError::Spawn {
                program: self.setprop,
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(PlatformError::CommandFailed {
                program: self.setprop,
                status,
            })
        }
    }
}
