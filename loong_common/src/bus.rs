//! Fieldbus transports known to the driver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transport a device is attached to.
///
/// Only [`Bus::Ecat`] exchanges a cyclic process image and carries
/// mailbox descriptors today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bus {
    /// Cyclic fieldbus (EtherCAT).
    #[serde(rename = "ECAT")]
    Ecat,
    /// CAN bus.
    #[serde(rename = "CAN")]
    Can,
    /// RS-485 serial line.
    #[serde(rename = "RS485")]
    Rs485,
}

impl Bus {
    /// Canonical name as written in configuration files.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ecat => "ECAT",
            Self::Can => "CAN",
            Self::Rs485 => "RS485",
        }
    }

    /// Whether this transport exchanges a cyclic process image.
    pub const fn is_cyclic(self) -> bool {
        matches!(self, Self::Ecat)
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown bus name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown bus '{0}'")]
pub struct UnknownBus(pub String);

impl FromStr for Bus {
    type Err = UnknownBus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ECAT" => Ok(Self::Ecat),
            "CAN" => Ok(Self::Can),
            "RS485" => Ok(Self::Rs485),
            other => Err(UnknownBus(other.to_string())),
        }
    }
}
