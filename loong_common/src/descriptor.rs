//! Mailbox object addressing.
//!
//! A transport descriptor locates one object in a device's parameter space
//! (index/subindex), together with its width and signedness. Descriptors
//! come from the external descriptor table, keyed by bus, device type and
//! object name.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Object name of the drive temperature entry.
pub const TEMPERATURE_OBJECT: &str = "Temperature";

/// Object name of the drive fault-reset entry.
pub const CLEAR_ERROR_OBJECT: &str = "ClearError";

/// Width of a mailbox object value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum BitLength {
    /// 8-bit object.
    Bits8 = 8,
    /// 16-bit object.
    Bits16 = 16,
    /// 32-bit object.
    Bits32 = 32,
}

/// Error returned for widths other than 8, 16 or 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported bit length {0} (expected 8, 16 or 32)")]
pub struct InvalidBitLength(pub u8);

impl TryFrom<u8> for BitLength {
    type Error = InvalidBitLength;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            8 => Ok(Self::Bits8),
            16 => Ok(Self::Bits16),
            32 => Ok(Self::Bits32),
            other => Err(InvalidBitLength(other)),
        }
    }
}

impl From<BitLength> for u8 {
    fn from(value: BitLength) -> Self {
        value as u8
    }
}

impl BitLength {
    /// Width in bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        self as u32
    }

    /// Width in bytes.
    #[inline]
    pub const fn bytes(self) -> usize {
        (self as usize) / 8
    }

    #[inline]
    const fn mask(self) -> u32 {
        match self {
            Self::Bits8 => 0xFF,
            Self::Bits16 => 0xFFFF,
            Self::Bits32 => 0xFFFF_FFFF,
        }
    }

    /// Interpret the low `bits()` bits of `raw` as a value.
    ///
    /// Signed objects are sign-extended from their top bit, unsigned ones
    /// are zero-extended.
    #[inline]
    pub const fn decode(self, raw: u32, signed: bool) -> i64 {
        let raw = raw & self.mask();
        if signed {
            let shift = 32 - self.bits();
            (((raw << shift) as i32) >> shift) as i64
        } else {
            raw as i64
        }
    }

    /// Truncate `value` to the object width (two's complement).
    #[inline]
    pub const fn encode(self, value: i64) -> u32 {
        (value as u32) & self.mask()
    }
}

/// Addressing of one mailbox object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportDescriptor {
    /// Object index.
    pub index: u16,
    /// Object subindex.
    pub subindex: u8,
    /// Object width.
    pub bit_length: BitLength,
    /// Whether the object holds a signed integer.
    pub signed: bool,
}
