//! Command and event connections to the supplicant.

use std::io;
use std::sync::Arc;

use nanowifi_config::{Config, ControlEndpoint};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::CONTROL_TARGET;
use super::transport::{ControlConnection, ControlTransport, TransportError};
use crate::platform::{PropertyStore, Sleeper};
use crate::poll::{PollSchedule, Probe};

/// Event emitted by the supplicant when it shuts down. The channel
/// synthesises it when the monitor connection fails.
pub const TERMINATING_EVENT: &str = "CTRL-EVENT-TERMINATING ";

/// Reply buffer size used by [`ControlChannel::command`].
pub const COMMAND_REPLY_CAPACITY: usize = 4096;

/// Event buffer size used by [`ControlChannel::next_event`].
pub const EVENT_BUFFER_CAPACITY: usize = 256;

const STATE_RUNNING: &str = "running";
const FAILURE_PREFIX: &[u8] = b"FAIL";
const PING_COMMAND: &str = "PING";

/// Errors raised while establishing the control connections.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The supplicant service is not reporting `running`.
    #[error("supplicant is not running ('{property}' is not 'running')")]
    DaemonNotRunning {
        /// State property that was checked.
        property: String,
    },
    /// No interface has been recorded by a driver load.
    #[error("no interface recorded; load the driver first")]
    NoInterface,
    /// The control endpoint could not be opened.
    #[error("failed to open control endpoint {endpoint}: {source}")]
    Open {
        /// Endpoint that was tried.
        endpoint: String,
        /// Last socket error observed.
        #[source]
        source: io::Error,
    },
    /// The monitor connection could not be registered for events.
    #[error("failed to attach event monitor on {endpoint}: {source}")]
    Attach {
        /// Endpoint that was tried.
        endpoint: String,
        /// Attach failure.
        #[source]
        source: TransportError,
    },
}

/// Errors raised by a single command exchange.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No command connection is open.
    #[error("not connected to the supplicant")]
    NotConnected,
    /// The supplicant did not reply in time.
    #[error("command '{command}' timed out")]
    Timeout {
        /// Command that was sent.
        command: String,
    },
    /// The exchange failed at the transport level.
    #[error("command '{command}' failed: {source}")]
    Transport {
        /// Command that was sent.
        command: String,
        /// Transport failure.
        #[source]
        source: TransportError,
    },
    /// The supplicant answered with a `FAIL` reply.
    #[error("command '{command}' was rejected: {reply}")]
    Rejected {
        /// Command that was sent.
        command: String,
        /// Reply text received.
        reply: String,
    },
}

impl CommandError {
    /// Numeric code used by callers that report failures as integers: `-2`
    /// for timeouts and `-1` for everything else.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Timeout { .. } => -2,
            Self::NotConnected | Self::Transport { .. } | Self::Rejected { .. } => -1,
        }
    }
}

/// At most one command connection and one event monitor.
pub struct ControlChannel {
    config: Arc<Config>,
    properties: Arc<dyn PropertyStore>,
    transport: Arc<dyn ControlTransport>,
    sleeper: Arc<dyn Sleeper>,
    command: Option<Box<dyn ControlConnection>>,
    monitor: Option<Box<dyn ControlConnection>>,
}

impl ControlChannel {
    /// Builds a disconnected channel.
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        properties: Arc<dyn PropertyStore>,
        transport: Arc<dyn ControlTransport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            config,
            properties,
            transport,
            sleeper,
            command: None,
            monitor: None,
        }
    }

    /// Whether both connections are open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.command.is_some() && self.monitor.is_some()
    }

    /// Opens the command and monitor connections for `interface`.
    ///
    /// Any existing pair is closed first. Opening the command connection is
    /// retried until the supplicant timeout elapses, since the socket may
    /// appear shortly after the service reports `running`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::DaemonNotRunning`] or
    /// [`ChannelError::NoInterface`] without touching any socket, and
    /// [`ChannelError::Open`] or [`ChannelError::Attach`] when a connection
    /// fails. On failure the channel is left disconnected.
    pub fn connect(&mut self, interface: Option<&str>) -> Result<(), ChannelError> {
        let property = &self.config.daemon_state_property;
        if self.properties.get(property).as_deref() != Some(STATE_RUNNING) {
            error!(
                target: CONTROL_TARGET,
                property = %property,
                "supplicant not running, cannot connect"
            );
            return Err(ChannelError::DaemonNotRunning {
                property: property.clone(),
            });
        }
        let Some(interface) = interface else {
            error!(target: CONTROL_TARGET, "no interface recorded, cannot connect");
            return Err(ChannelError::NoInterface);
        };

        self.close();
        let endpoint = ControlEndpoint::resolve(&self.config.ctrl_iface_dir, interface);
        debug!(target: CONTROL_TARGET, endpoint = %endpoint, "connecting to supplicant");

        let transport = &self.transport;
        let mut last_error = None;
        let command = PollSchedule::with_budget(self.config.supplicant_timeout())
            .run(self.sleeper.as_ref(), || match transport.open(&endpoint) {
                Ok(connection) => Probe::Ready(connection),
                Err(error) => {
                    last_error = Some(error);
                    Probe::Pending
                }
            })
            .ok_or_else(|| {
                let source = last_error
                    .take()
                    .unwrap_or_else(|| io::Error::from(io::ErrorKind::TimedOut));
                error!(
                    target: CONTROL_TARGET,
                    endpoint = %endpoint,
                    error = %source,
                    "unable to open command connection"
                );
                ChannelError::Open {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })?;

        let mut monitor = self.transport.open(&endpoint).map_err(|source| {
            error!(
                target: CONTROL_TARGET,
                endpoint = %endpoint,
                error = %source,
                "unable to open monitor connection"
            );
            ChannelError::Open {
                endpoint: endpoint.to_string(),
                source,
            }
        })?;
        monitor.attach().map_err(|source| {
            error!(
                target: CONTROL_TARGET,
                endpoint = %endpoint,
                error = %source,
                "unable to attach event monitor"
            );
            ChannelError::Attach {
                endpoint: endpoint.to_string(),
                source,
            }
        })?;

        self.command = Some(command);
        self.monitor = Some(monitor);
        info!(target: CONTROL_TARGET, endpoint = %endpoint, "connected to supplicant");
        Ok(())
    }

    /// Sends `command` and copies the reply into `reply`.
    ///
    /// A `PING` reply is NUL-terminated when the buffer has room for it.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when disconnected, when the exchange fails
    /// or times out, and when the reply starts with `FAIL`.
    pub fn send(&mut self, command: &str, reply: &mut [u8]) -> Result<usize, CommandError> {
        let Some(connection) = self.command.as_mut() else {
            debug!(target: CONTROL_TARGET, command, "not connected; dropping command");
            return Err(CommandError::NotConnected);
        };

        let len = match connection.request(command.as_bytes(), reply) {
            Ok(len) => len,
            Err(TransportError::Timeout) => {
                warn!(target: CONTROL_TARGET, command, "command timed out");
                return Err(CommandError::Timeout {
                    command: command.to_owned(),
                });
            }
            Err(source) => {
                warn!(target: CONTROL_TARGET, command, error = %source, "command failed");
                return Err(CommandError::Transport {
                    command: command.to_owned(),
                    source,
                });
            }
        };

        let body = reply.get(..len).unwrap_or_default();
        if body.starts_with(FAILURE_PREFIX) {
            return Err(CommandError::Rejected {
                command: command.to_owned(),
                reply: String::from_utf8_lossy(body).trim_end().to_owned(),
            });
        }
        if command.starts_with(PING_COMMAND)
            && let Some(terminator) = reply.get_mut(len)
        {
            *terminator = 0;
        }
        Ok(len)
    }

    /// Sends `command` with an internal reply buffer and returns the reply
    /// text.
    ///
    /// # Errors
    ///
    /// Same as [`Self::send`].
    pub fn command(&mut self, command: &str) -> Result<String, CommandError> {
        let mut reply = vec![0_u8; COMMAND_REPLY_CAPACITY];
        let len = self.send(command, &mut reply)?;
        reply.truncate(len);
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    /// Blocks until the next event arrives and copies it into `buf`.
    ///
    /// Events are NUL-terminated and any leading `<level>` tag is removed.
    /// When the monitor is missing or fails, a `CTRL-EVENT-TERMINATING`
    /// event describing the failure is written instead. Returns the event
    /// length, excluding the terminator.
    pub fn wait_event(&mut self, buf: &mut [u8]) -> usize {
        let Some(monitor) = self.monitor.as_mut() else {
            return synthesise_termination(buf, "connection closed");
        };

        let capacity = buf.len().saturating_sub(1);
        let Some(window) = buf.get_mut(..capacity) else {
            return 0;
        };
        match monitor.recv(window) {
            Err(error) => {
                debug!(target: CONTROL_TARGET, error = %error, "event receive failed");
                synthesise_termination(buf, "recv error")
            }
            Ok(0) => synthesise_termination(buf, "signal 0 received"),
            Ok(received) => {
                let len = strip_level_prefix(buf, received);
                if let Some(terminator) = buf.get_mut(len) {
                    *terminator = 0;
                }
                len
            }
        }
    }

    /// Waits for the next event using an internal buffer.
    pub fn next_event(&mut self) -> String {
        let mut buf = vec![0_u8; EVENT_BUFFER_CAPACITY];
        let len = self.wait_event(&mut buf);
        buf.truncate(len);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Closes both connections. Safe to call when already closed.
    pub fn close(&mut self) {
        let had_command = self.command.take().is_some();
        let had_monitor = self.monitor.take().is_some();
        if had_command || had_monitor {
            debug!(target: CONTROL_TARGET, "closed supplicant connections");
        }
    }

    /// Removes stale client sockets through the transport.
    pub fn cleanup(&self) {
        self.transport.cleanup();
    }
}

/// Removes a leading `<...>` tag from the first `received` bytes of `buf`,
/// shifting the remainder to the front. Returns the new length.
///
/// Messages without a closing `>` are left unchanged.
pub fn strip_level_prefix(buf: &mut [u8], received: usize) -> usize {
    let len = received.min(buf.len());
    if buf.first() != Some(&b'<') {
        return len;
    }
    let Some(close) = buf
        .get(..len)
        .and_then(|message| message.iter().position(|byte| *byte == b'>'))
    else {
        return len;
    };
    let start = close + 1;
    buf.copy_within(start..len, 0);
    len - start
}

fn synthesise_termination(buf: &mut [u8], reason: &str) -> usize {
    let message = format!("{TERMINATING_EVENT} - {reason}");
    let len = message.len().min(buf.len().saturating_sub(1));
    if let (Some(target), Some(source)) = (buf.get_mut(..len), message.as_bytes().get(..len)) {
        target.copy_from_slice(source);
    }
    if let Some(terminator) = buf.get_mut(len) {
        *terminator = 0;
    }
    len
}
