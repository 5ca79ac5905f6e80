//! Platform collaborators: system properties, init services and timing.
//!
//! The lifecycle state machines only ever talk to the platform through the
//! traits defined here. Production builds use [`AndroidProperties`] and
//! [`InitServiceManager`]; tests substitute [`MemoryProperties`] and their own
//! recording doubles.

mod probe;
mod properties;
mod services;

use std::io;
use std::process::ExitStatus;
use std::thread;
use std::time::Duration;

use thiserror::Error;

pub use probe::{PollingStateProbe, SerialStateProbe, ServiceObservation, ServiceStateProbe};
pub use properties::{
    AndroidProperties, MemoryProperties, PropertySerials, PropertySnapshot, PropertyStore,
    set_verified,
};
pub use services::{InitServiceManager, ServiceManager};

pub(crate) const PLATFORM_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::platform");

/// Errors raised by platform collaborators.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// A helper program could not be launched.
    #[error("failed to run '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: &'static str,
        /// Underlying launch failure.
        #[source]
        source: io::Error,
    },
    /// A helper program ran but reported failure.
    #[error("'{program}' exited with {status}")]
    CommandFailed {
        /// Program that failed.
        program: &'static str,
        /// Exit status reported by the program.
        status: ExitStatus,
    },
    /// The property store refused the write.
    #[error("property '{key}' rejected value '{value}'")]
    Rejected {
        /// Property key.
        key: String,
        /// Value that was refused.
        value: String,
    },
}

/// Source of delays used by every polling loop.
pub trait Sleeper: Send + Sync {
    /// Blocks the caller for `duration`.
    fn sleep(&self, duration: Duration);

    /// Gives other runnable work a chance to execute before polling begins.
    fn yield_now(&self) {
        thread::yield_now();
    }
}

/// [`Sleeper`] backed by the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}
