//! Prelude module for common re-exports.
//!
//! ```rust
//! use loong_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::driver_config::{
    CycleConfig, DescriptorEntry, DeviceClass, DeviceEntry, DriverConfig, MailboxConfig,
    MotorEntry,
};
pub use crate::provider::{ConfigProvider, MotorKey};

// ─── Bus & addressing ───────────────────────────────────────────────
pub use crate::bus::Bus;
pub use crate::descriptor::{
    BitLength, CLEAR_ERROR_OBJECT, TEMPERATURE_OBJECT, TransportDescriptor,
};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{DEFAULT_CYCLE_TIME_US, SWAP_SLOTS};

/// Default cycle time as Duration.
pub const DEFAULT_CYCLE_TIME: Duration = Duration::from_micros(DEFAULT_CYCLE_TIME_US as u64);
