use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Radio role selecting which firmware image the driver should load.
#[derive(
    Debug,
    Clone,
    Copy,
    Deserialize,
    Serialize,
    PartialEq,
    Eq,
    Hash,
    EnumString,
    Display,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum FirmwareMode {
    /// Client (station) mode.
    #[strum(serialize = "sta")]
    Station,
    /// Soft access point mode.
    #[strum(serialize = "ap")]
    AccessPoint,
    /// Wi-Fi Direct mode.
    #[strum(serialize = "p2p")]
    PeerToPeer,
}

impl FirmwareMode {
    /// Maps the framework's numeric firmware selector onto a mode.
    ///
    /// Unrecognised selectors yield `None`.
    #[must_use]
    pub const fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Station),
            1 => Some(Self::AccessPoint),
            2 => Some(Self::PeerToPeer),
            _ => None,
        }
    }
}
