//! Bounded polling shared by every wait in the crate.
//!
//! All waits probe once immediately, then sleep a fixed step between probes
//! until the budget is spent. The final probe happens after the last sleep,
//! so a state reached right at the deadline is still observed.

use std::time::Duration;

use crate::platform::Sleeper;

/// Default interval between probes.
pub const POLL_STEP: Duration = Duration::from_millis(100);

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe<T> {
    /// The awaited condition holds; stop polling with this value.
    Ready(T),
    /// Keep polling.
    Pending,
}

/// Step and budget for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    step: Duration,
    budget: Duration,
}

impl PollSchedule {
    /// Builds a schedule sleeping `step` between probes for up to `budget`.
    #[must_use]
    pub const fn new(step: Duration, budget: Duration) -> Self {
        Self { step, budget }
    }

    /// Builds a schedule using [`POLL_STEP`].
    #[must_use]
    pub const fn with_budget(budget: Duration) -> Self {
        Self::new(POLL_STEP, budget)
    }

    /// Builds a schedule that probes at most `attempts` times.
    #[must_use]
    pub fn attempts(step: Duration, attempts: u32) -> Self {
        Self::new(step, step.saturating_mul(attempts.saturating_sub(1)))
    }

    /// Total time budget.
    #[must_use]
    pub const fn budget(&self) -> Duration {
        self.budget
    }

    /// Interval slept between probes.
    #[must_use]
    pub const fn step(&self) -> Duration {
        self.step
    }

    /// Runs `probe` until it reports [`Probe::Ready`] or the budget runs out.
    ///
    /// Returns `None` when the budget is exhausted without the condition
    /// holding. A zero step disables sleeping and probes exactly once.
    pub fn run<T>(&self, sleeper: &dyn Sleeper, mut probe: impl FnMut() -> Probe<T>) -> Option<T> {
        let mut remaining = self.budget;
        loop {
            if let Probe::Ready(value) = probe() {
                return Some(value);
            }
            if remaining.is_zero() || self.step.is_zero() {
                return None;
            }
            sleeper.sleep(self.step);
            remaining = remaining.saturating_sub(self.step);
        }
    }
}
