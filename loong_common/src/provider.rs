//! Configuration provider seam.
//!
//! Parameter loading never reads files itself; it asks a [`ConfigProvider`]
//! for calibration values and descriptor table entries. [`DriverConfig`]
//! is the TOML-backed provider, tests supply their own.
//!
//! [`DriverConfig`]: crate::driver_config::DriverConfig

use crate::bus::Bus;
use crate::consts::MOTOR_PARAMETER_COUNT;
use crate::descriptor::TransportDescriptor;
use std::fmt;

/// Calibration keys every motor must define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorKey {
    /// Direction sign, +1 or -1.
    Polarity,
    /// Encoder count at the joint's zero position.
    CountBias,
    /// Encoder counts per revolution.
    EncoderResolution,
    /// Gear ratio applied to torque.
    GearRatioTor,
    /// Gear ratio applied to position and velocity.
    GearRatioPosVel,
    /// Rated current in amperes.
    RatedCurrent,
    /// Torque per ampere.
    TorqueConstant,
    /// Rated torque.
    RatedTorque,
    /// Torque limit.
    MaximumTorque,
    /// Lower joint limit.
    MinimumPosition,
    /// Upper joint limit.
    MaximumPosition,
}

impl MotorKey {
    /// All keys, in load order.
    pub const ALL: [MotorKey; MOTOR_PARAMETER_COUNT] = [
        MotorKey::Polarity,
        MotorKey::CountBias,
        MotorKey::EncoderResolution,
        MotorKey::GearRatioTor,
        MotorKey::GearRatioPosVel,
        MotorKey::RatedCurrent,
        MotorKey::TorqueConstant,
        MotorKey::RatedTorque,
        MotorKey::MaximumTorque,
        MotorKey::MinimumPosition,
        MotorKey::MaximumPosition,
    ];

    /// Key name used in diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Polarity => "Polarity",
            Self::CountBias => "CountBias",
            Self::EncoderResolution => "EncoderResolution",
            Self::GearRatioTor => "GearRatioTor",
            Self::GearRatioPosVel => "GearRatioPosVel",
            Self::RatedCurrent => "RatedCurrent",
            Self::TorqueConstant => "TorqueConstant",
            Self::RatedTorque => "RatedTorque",
            Self::MaximumTorque => "MaximumTorque",
            Self::MinimumPosition => "MinimumPosition",
            Self::MaximumPosition => "MaximumPosition",
        }
    }
}

impl fmt::Display for MotorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of per-device calibration values and mailbox addressing.
///
/// Both lookups return `None` when the entry is absent; callers decide
/// whether absence is fatal.
pub trait ConfigProvider {
    /// Calibration value `key` of the motor with `alias`.
    fn motor_parameter(&self, alias: u16, key: MotorKey) -> Option<f32>;

    /// Descriptor table entry for `object` on a `device_type` attached to `bus`.
    fn transport_descriptor(
        &self,
        bus: Bus,
        device_type: &str,
        object: &str,
    ) -> Option<TransportDescriptor>;
}
