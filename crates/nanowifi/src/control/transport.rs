//! Transport seam for control connections.

use std::io;

use nanowifi_config::ControlEndpoint;
use thiserror::Error;

/// Errors raised by a single control exchange.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No reply arrived within the request budget.
    #[error("control request timed out")]
    Timeout,
    /// The peer answered with something other than the expected
    /// acknowledgement.
    #[error("control request refused: {reply}")]
    Refused {
        /// Reply text received.
        reply: String,
    },
    /// The socket failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One open connection to the supplicant's control endpoint.
///
/// Dropping the connection closes it.
pub trait ControlConnection: Send {
    /// Sends `command` and copies the reply into `reply`, returning its
    /// length.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] when no reply arrives in time and
    /// [`TransportError::Io`] when the socket fails.
    fn request(&mut self, command: &[u8], reply: &mut [u8]) -> Result<usize, TransportError>;

    /// Registers this connection as an event monitor.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the supplicant does not acknowledge
    /// the registration.
    fn attach(&mut self) -> Result<(), TransportError>;

    /// Blocks until the next unsolicited message arrives and copies it into
    /// `buf`. A zero-length result means the peer sent an empty datagram.
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Factory for control connections.
pub trait ControlTransport: Send + Sync {
    /// Opens a new connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error when the endpoint cannot be
    /// reached.
    fn open(&self, endpoint: &ControlEndpoint) -> io::Result<Box<dyn ControlConnection>>;

    /// Removes client socket files left behind by earlier processes.
    fn cleanup(&self);
}
