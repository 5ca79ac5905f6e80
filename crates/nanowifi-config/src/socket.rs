use std::fmt;
use std::fs::DirBuilder;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix used for reserved socket names published by init.
const RESERVED_PREFIX: &str = "wpa_";

/// Location of the supplicant control socket for one interface.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlEndpoint {
    /// Socket inside the supplicant's per-interface control directory.
    Path { path: Utf8PathBuf },
    /// Bare identifier resolved against the reserved socket directory.
    Reserved { name: String },
}

impl ControlEndpoint {
    /// Builds an endpoint addressing a socket path directly.
    #[must_use]
    pub fn path(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Path { path: path.into() }
    }

    /// Builds an endpoint addressing a reserved socket by name.
    #[must_use]
    pub fn reserved(name: impl Into<String>) -> Self {
        Self::Reserved { name: name.into() }
    }

    /// Chooses the endpoint for `interface`.
    ///
    /// When the per-interface control directory exists the socket lives inside
    /// it; otherwise the interface name is used as a bare identifier.
    #[must_use]
    pub fn resolve(ctrl_iface_dir: &Utf8Path, interface: &str) -> Self {
        if ctrl_iface_dir.as_std_path().exists() {
            Self::path(ctrl_iface_dir.join(interface))
        } else {
            Self::reserved(interface)
        }
    }

    /// Filesystem path of the socket, given the reserved socket directory.
    #[must_use]
    pub fn socket_path(&self, reserved_dir: &Utf8Path) -> Utf8PathBuf {
        match self {
            Self::Path { path } => path.clone(),
            Self::Reserved { name } => reserved_dir.join(format!("{RESERVED_PREFIX}{name}")),
        }
    }
}

impl fmt::Display for ControlEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path { path } => write!(formatter, "unix://{path}"),
            Self::Reserved { name } => write!(formatter, "reserved://{name}"),
        }
    }
}

/// Ensures the directory holding client sockets exists.
///
/// The directory is shared with the supplicant's group, so it is created
/// with group access rather than the owner-only mode used elsewhere.
pub fn prepare_socket_directory(dir: &Utf8Path) -> Result<(), SocketPreparationError> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o770);
    }

    if let Err(source) = builder.create(dir.as_std_path())
        && source.kind() != std::io::ErrorKind::AlreadyExists
    {
        return Err(SocketPreparationError::CreateDirectory {
            path: dir.to_path_buf(),
            source,
        });
    }

    Ok(())
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// Failed to create or adjust socket directories.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}
