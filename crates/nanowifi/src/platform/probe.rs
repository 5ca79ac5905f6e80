//! Observation of init service state across a start request.

use std::sync::Arc;

use super::{PropertySerials, PropertyStore};

/// One reading of a service state property.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceObservation {
    /// Current value of the state property, if set.
    pub value: Option<String>,
    /// Whether the property has been rewritten since the probe was armed.
    pub changed: bool,
}

/// Watches a service state property for transitions.
///
/// Start-up polling arms the probe before issuing the start request so a
/// service that starts and immediately exits can be told apart from one that
/// never started.
pub trait ServiceStateProbe: Send {
    /// Records the property's current change counter as the baseline.
    fn arm(&mut self, key: &str);

    /// Reads the property and reports whether it changed since [`Self::arm`].
    fn observe(&mut self, key: &str) -> ServiceObservation;
}

/// Probe backed by property change counters.
pub struct SerialStateProbe {
    serials: Arc<dyn PropertySerials>,
    baseline: u32,
}

impl SerialStateProbe {
    /// Creates a probe reading counters from `serials`.
    #[must_use]
    pub fn new(serials: Arc<dyn PropertySerials>) -> Self {
        Self {
            serials,
            baseline: 0,
        }
    }
}

impl ServiceStateProbe for SerialStateProbe {
    fn arm(&mut self, key: &str) {
        // An absent property counts as serial zero so its first appearance
        // registers as a change.
        self.baseline = self
            .serials
            .snapshot(key)
            .map_or(0, |snapshot| snapshot.serial);
    }

    fn observe(&mut self, key: &str) -> ServiceObservation {
        match self.serials.snapshot(key) {
            Some(snapshot) => ServiceObservation {
                changed: snapshot.serial != self.baseline,
                value: Some(snapshot.value),
            },
            None => ServiceObservation::default(),
        }
    }
}

/// Probe for stores without change counters.
///
/// It never reports a change, so crash-on-start detection degrades to
/// waiting out the full start budget.
pub struct PollingStateProbe {
    properties: Arc<dyn PropertyStore>,
}

impl PollingStateProbe {
    /// Creates a probe reading values from `properties`.
    #[must_use]
    pub fn new(properties: Arc<dyn PropertyStore>) -> Self {
        Self { properties }
    }
}

impl ServiceStateProbe for PollingStateProbe {
    fn arm(&mut self, _key: &str) {}

    fn observe(&mut self, key: &str) -> ServiceObservation {
        ServiceObservation {
            value: self.properties.get(key),
            changed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemoryProperties;

    const STATE: &str = "init.svc.wpa_supplicant";

    #[test]
    fn serial_probe_detects_rewrite_after_arming() {
        let store = Arc::new(MemoryProperties::with_entries([(STATE, "stopped")]));
        let mut probe = SerialStateProbe::new(store.clone());
        probe.arm(STATE);
        assert!(!probe.observe(STATE).changed);

        store.set(STATE, "stopped").expect("rewrite");
        let observation = probe.observe(STATE);
        assert!(observation.changed);
        assert_eq!(observation.value.as_deref(), Some("stopped"));
    }

    #[test]
    fn serial_probe_treats_first_appearance_as_change() {
        let store = Arc::new(MemoryProperties::new());
        let mut probe = SerialStateProbe::new(store.clone());
        probe.arm(STATE);
        assert_eq!(probe.observe(STATE), ServiceObservation::default());

        store.set(STATE, "running").expect("write");
        assert!(probe.observe(STATE).changed);
    }

    #[test]
    fn polling_probe_never_reports_change() {
        let store = Arc::new(MemoryProperties::with_entries([(STATE, "stopped")]));
        let mut probe = PollingStateProbe::new(store.clone());
        probe.arm(STATE);
        store.set(STATE, "stopped").expect("rewrite");
        let observation = probe.observe(STATE);
        assert!(!observation.changed);
        assert_eq!(observation.value.as_deref(), Some("stopped"));
    }
}
