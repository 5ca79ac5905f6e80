//! Datagram-socket transport compatible with the supplicant control
//! interface.
//!
//! Each connection binds its own client socket so the supplicant can address
//! replies and events back to it.

use std::fs;
use std::io;
use std::os::unix::net::UnixDatagram;
use std::process;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use nanowifi_config::{Config, ControlEndpoint, prepare_socket_directory};
use tracing::{debug, warn};

use super::CONTROL_TARGET;
use super::transport::{ControlConnection, ControlTransport, TransportError};

/// File name prefix of client sockets bound by this transport.
const CLIENT_PREFIX: &str = "wpa_ctrl_";

const ATTACH_COMMAND: &[u8] = b"ATTACH";
const ATTACH_ACK: &[u8] = b"OK\n";

/// [`ControlTransport`] over Unix datagram sockets.
#[derive(Debug)]
pub struct UnixControlTransport {
    client_dir: Utf8PathBuf,
    reserved_dir: Utf8PathBuf,
    request_timeout: Duration,
    counter: AtomicU32,
}

impl UnixControlTransport {
    /// Builds a transport from the configured socket directories.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            client_dir: config.client_socket_dir.clone(),
            reserved_dir: config.reserved_socket_dir.clone(),
            request_timeout: config.request_timeout(),
            counter: AtomicU32::new(0),
        }
    }

    fn next_client_path(&self) -> Utf8PathBuf {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        self.client_dir
            .join(format!("{CLIENT_PREFIX}{}-{sequence}", process::id()))
    }
}

impl ControlTransport for UnixControlTransport {
    fn open(&self, endpoint: &ControlEndpoint) -> io::Result<Box<dyn ControlConnection>> {
        prepare_socket_directory(&self.client_dir).map_err(io::Error::other)?;
        let local = self.next_client_path();
        remove_if_present(&local)?;
        let socket = UnixDatagram::bind(&local)?;
        let connection = UnixConnection {
            socket,
            local,
            request_timeout: self.request_timeout,
        };
        let remote = endpoint.socket_path(&self.reserved_dir);
        // Dropping the connection on failure unlinks the client socket.
        connection.socket.connect(&remote)?;
        debug!(
            target: CONTROL_TARGET,
            local = %connection.local,
            remote = %remote,
            "opened control connection"
        );
        Ok(Box::new(connection))
    }

    fn cleanup(&self) {
        let entries = match fs::read_dir(&self.client_dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return,
            Err(error) => {
                warn!(
                    target: CONTROL_TARGET,
                    dir = %self.client_dir,
                    error = %error,
                    "cannot list client socket directory"
                );
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(CLIENT_PREFIX) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!(
                    target: CONTROL_TARGET,
                    socket = %entry.path().display(),
                    "removed stale client socket"
                ),
                Err(error) => warn!(
                    target: CONTROL_TARGET,
                    socket = %entry.path().display(),
                    error = %error,
                    "cannot remove stale client socket"
                ),
            }
        }
    }
}

struct UnixConnection {
    socket: UnixDatagram,
    local: Utf8PathBuf,
    request_timeout: Duration,
}

impl ControlConnection for UnixConnection {
    fn request(&mut self, command: &[u8], reply: &mut [u8]) -> Result<usize, TransportError> {
        self.socket.set_read_timeout(Some(self.request_timeout))?;
        self.socket.send(command)?;
        loop {
            let received = match self.socket.recv(reply) {
                Ok(received) => received,
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Err(TransportError::Timeout);
                }
                Err(error) => return Err(TransportError::Io(error)),
            };
            // Unsolicited events can arrive on an attached connection while a
            // request is in flight.
            if reply
                .get(..received)
                .is_some_and(|message| message.starts_with(b"<"))
            {
                continue;
            }
            return Ok(received);
        }
    }

    fn attach(&mut self) -> Result<(), TransportError> {
        let mut reply = [0_u8; 16];
        let received = self.request(ATTACH_COMMAND, &mut reply)?;
        let answer = reply.get(..received).unwrap_or_default();
        if answer == ATTACH_ACK {
            Ok(())
        } else {
            Err(TransportError::Refused {
                reply: String::from_utf8_lossy(answer).into_owned(),
            })
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.set_read_timeout(None)?;
        self.socket.recv(buf)
    }
}

impl Drop for UnixConnection {
    fn drop(&mut self) {
        if let Err(error) = remove_if_present(&self.local) {
            debug!(
                target: CONTROL_TARGET,
                socket = %self.local,
                error = %error,
                "cannot remove client socket"
            );
        }
    }
}

fn remove_if_present(path: &Utf8Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}
