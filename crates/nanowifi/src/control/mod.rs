//! Client side of the supplicant control protocol.
//!
//! A [`ControlChannel`] holds at most one pair of connections to the
//! supplicant: one for request/reply commands and one attached as an event
//! monitor. Connections are produced by a [`ControlTransport`], which in
//! production is the datagram-socket [`UnixControlTransport`].

mod channel;
mod transport;
mod unix;

pub use channel::{
    COMMAND_REPLY_CAPACITY, ChannelError, CommandError, ControlChannel, EVENT_BUFFER_CAPACITY,
    TERMINATING_EVENT, strip_level_prefix,
};
pub use transport::{ControlConnection, ControlTransport, TransportError};
pub use unix::UnixControlTransport;

pub(crate) const CONTROL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::control");
