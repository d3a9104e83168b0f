//! Driver configuration loaded from `driver.toml`.
//!
//! Holds the per-motor calibration values, the transport descriptor table,
//! mailbox channel limits and the device list used by the simulation
//! binary. [`DriverConfig`] implements [`ConfigProvider`], so it can be
//! handed straight to parameter loading.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! service_name = "loong-sim"
//!
//! [mailbox]
//! pool_size = 32
//! max_starts_per_cycle = 2
//! timeout_cycles = 500
//!
//! [[motors]]
//! alias = 1
//! polarity = 1.0
//! count_bias = 0.0
//! encoder_resolution = 131072.0
//! gear_ratio_tor = 101.0
//! gear_ratio_pos_vel = 101.0
//! rated_current = 4.2
//! torque_constant = 0.11
//! rated_torque = 0.46
//! maximum_torque = 2000.0
//! minimum_position = -3.14
//! maximum_position = 3.14
//!
//! [[descriptors]]
//! bus = "ECAT"
//! device_type = "JointDrive"
//! object = "Temperature"
//! index = 0x2026
//! subindex = 0
//! bit_length = 16
//! signed = true
//! ```

use crate::bus::Bus;
use crate::config::{ConfigError, SharedConfig};
use crate::consts::{
    DEFAULT_CYCLE_TIME_US, DEFAULT_MAILBOX_POOL_SIZE, DEFAULT_MAILBOX_STARTS_PER_CYCLE,
    DEFAULT_MAILBOX_TIMEOUT_CYCLES, MAX_MAILBOX_IN_FLIGHT, MAX_MAILBOX_POOL_SIZE,
};
use crate::descriptor::{BitLength, TransportDescriptor};
use crate::provider::{ConfigProvider, MotorKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_cycle_time_us() -> u32 {
    DEFAULT_CYCLE_TIME_US
}

fn default_pool_size() -> usize {
    DEFAULT_MAILBOX_POOL_SIZE
}

fn default_starts_per_cycle() -> usize {
    DEFAULT_MAILBOX_STARTS_PER_CYCLE
}

fn default_timeout_cycles() -> u32 {
    DEFAULT_MAILBOX_TIMEOUT_CYCLES
}

/// Top-level driver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Common service settings.
    #[serde(default)]
    pub shared: SharedConfig,

    /// Cycle thread timing.
    #[serde(default)]
    pub cycle: CycleConfig,

    /// Mailbox channel limits.
    #[serde(default)]
    pub mailbox: MailboxConfig,

    /// Per-motor calibration values, keyed by alias.
    #[serde(default)]
    pub motors: Vec<MotorEntry>,

    /// Transport descriptor table.
    #[serde(default)]
    pub descriptors: Vec<DescriptorEntry>,

    /// Devices present on the bus (simulation wiring only).
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// Cycle thread timing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Cycle period in microseconds.
    #[serde(default = "default_cycle_time_us")]
    pub cycle_time_us: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            cycle_time_us: DEFAULT_CYCLE_TIME_US,
        }
    }
}

/// Mailbox channel limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Number of transaction slots allocated up front.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// New transactions started per cycle at most.
    #[serde(default = "default_starts_per_cycle")]
    pub max_starts_per_cycle: usize,

    /// Cycles an in-flight transaction may take before it fails.
    #[serde(default = "default_timeout_cycles")]
    pub timeout_cycles: u32,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_MAILBOX_POOL_SIZE,
            max_starts_per_cycle: DEFAULT_MAILBOX_STARTS_PER_CYCLE,
            timeout_cycles: DEFAULT_MAILBOX_TIMEOUT_CYCLES,
        }
    }
}

impl MailboxConfig {
    /// Validate channel limits.
    ///
    /// # Validation Rules
    /// 1. `1 <= pool_size <= MAX_MAILBOX_POOL_SIZE`
    /// 2. `1 <= max_starts_per_cycle <= MAX_MAILBOX_IN_FLIGHT`
    /// 3. `timeout_cycles > 0`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 || self.pool_size > MAX_MAILBOX_POOL_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "mailbox.pool_size must be in 1..={} (got {})",
                MAX_MAILBOX_POOL_SIZE, self.pool_size
            )));
        }
        if self.max_starts_per_cycle == 0 || self.max_starts_per_cycle > MAX_MAILBOX_IN_FLIGHT {
            return Err(ConfigError::ValidationError(format!(
                "mailbox.max_starts_per_cycle must be in 1..={} (got {})",
                MAX_MAILBOX_IN_FLIGHT, self.max_starts_per_cycle
            )));
        }
        if self.timeout_cycles == 0 {
            return Err(ConfigError::ValidationError(
                "mailbox.timeout_cycles must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Calibration values of one motor.
///
/// Every value is optional in the file; parameter loading rejects motors
/// with any value missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MotorEntry {
    /// Device alias.
    pub alias: u16,
    /// Direction sign.
    #[serde(default)]
    pub polarity: Option<f32>,
    /// Encoder count at zero position.
    #[serde(default)]
    pub count_bias: Option<f32>,
    /// Encoder counts per revolution.
    #[serde(default)]
    pub encoder_resolution: Option<f32>,
    /// Torque gear ratio.
    #[serde(default)]
    pub gear_ratio_tor: Option<f32>,
    /// Position/velocity gear ratio.
    #[serde(default)]
    pub gear_ratio_pos_vel: Option<f32>,
    /// Rated current.
    #[serde(default)]
    pub rated_current: Option<f32>,
    /// Torque per ampere.
    #[serde(default)]
    pub torque_constant: Option<f32>,
    /// Rated torque.
    #[serde(default)]
    pub rated_torque: Option<f32>,
    /// Torque limit.
    #[serde(default)]
    pub maximum_torque: Option<f32>,
    /// Lower joint limit.
    #[serde(default)]
    pub minimum_position: Option<f32>,
    /// Upper joint limit.
    #[serde(default)]
    pub maximum_position: Option<f32>,
}

impl MotorEntry {
    /// Value stored for `key`, if any.
    pub fn get(&self, key: MotorKey) -> Option<f32> {
        match key {
            MotorKey::Polarity => self.polarity,
            MotorKey::CountBias => self.count_bias,
            MotorKey::EncoderResolution => self.encoder_resolution,
            MotorKey::GearRatioTor => self.gear_ratio_tor,
            MotorKey::GearRatioPosVel => self.gear_ratio_pos_vel,
            MotorKey::RatedCurrent => self.rated_current,
            MotorKey::TorqueConstant => self.torque_constant,
            MotorKey::RatedTorque => self.rated_torque,
            MotorKey::MaximumTorque => self.maximum_torque,
            MotorKey::MinimumPosition => self.minimum_position,
            MotorKey::MaximumPosition => self.maximum_position,
        }
    }
}

/// One row of the transport descriptor table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorEntry {
    /// Bus the device type is attached to.
    pub bus: Bus,
    /// Device type name.
    pub device_type: String,
    /// Object name, e.g. `"Temperature"`.
    pub object: String,
    /// Object index.
    pub index: u16,
    /// Object subindex.
    #[serde(default)]
    pub subindex: u8,
    /// Object width.
    pub bit_length: BitLength,
    /// Signedness of the object value.
    #[serde(default)]
    pub signed: bool,
}

impl DescriptorEntry {
    /// Addressing part of the row.
    pub fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor {
            index: self.index,
            subindex: self.subindex,
            bit_length: self.bit_length,
            signed: self.signed,
        }
    }
}

/// Device class, selecting the process-data layout and parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    /// Joint motor drive.
    Motor,
    /// Dexterous hand.
    Hand,
    /// Digit actuator.
    Digit,
    /// ADC converter.
    Converter,
    /// Force/torque sensor.
    Sensor,
}

/// One device as enumerated on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Bus the device is attached to.
    pub bus: Bus,
    /// Master (bus instance) order.
    #[serde(default)]
    pub order: u32,
    /// Domain the device's process data lives in.
    #[serde(default)]
    pub domain: u32,
    /// Bus-local slave position.
    pub slave: u16,
    /// Device alias.
    pub alias: u16,
    /// Device type name (descriptor table key).
    pub device_type: String,
    /// Device class.
    pub class: DeviceClass,
}

impl DriverConfig {
    /// Validate the driver configuration.
    ///
    /// # Validation Rules
    /// 1. `[shared]` is valid
    /// 2. `cycle_time_us > 0`
    /// 3. Mailbox limits are valid
    /// 4. Motor aliases are unique
    /// 5. Descriptor rows are unique per (bus, device type, object)
    /// 6. Device aliases are unique, and (bus, order, slave) is unique
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.cycle.cycle_time_us == 0 {
            return Err(ConfigError::ValidationError(
                "cycle_time_us must be greater than 0".to_string(),
            ));
        }

        self.mailbox.validate()?;

        let mut aliases = HashSet::new();
        for motor in &self.motors {
            if !aliases.insert(motor.alias) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate motor alias: {}",
                    motor.alias
                )));
            }
        }

        let mut rows = HashSet::new();
        for row in &self.descriptors {
            if !rows.insert((row.bus, row.device_type.as_str(), row.object.as_str())) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate descriptor: {} {} {}",
                    row.bus, row.device_type, row.object
                )));
            }
        }

        let mut device_aliases = HashSet::new();
        let mut positions = HashSet::new();
        for device in &self.devices {
            if !device_aliases.insert(device.alias) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate device alias: {}",
                    device.alias
                )));
            }
            if !positions.insert((device.bus, device.order, device.slave)) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate device position: {} {}:{}",
                    device.bus, device.order, device.slave
                )));
            }
        }

        Ok(())
    }

    /// Calibration entry for `alias`.
    pub fn motor(&self, alias: u16) -> Option<&MotorEntry> {
        self.motors.iter().find(|m| m.alias == alias)
    }
}

impl ConfigProvider for DriverConfig {
    fn motor_parameter(&self, alias: u16, key: MotorKey) -> Option<f32> {
        self.motor(alias).and_then(|m| m.get(key))
    }

    fn transport_descriptor(
        &self,
        bus: Bus,
        device_type: &str,
        object: &str,
    ) -> Option<TransportDescriptor> {
        self.descriptors
            .iter()
            .find(|row| row.bus == bus && row.device_type == device_type && row.object == object)
            .map(DescriptorEntry::descriptor)
    }
}
