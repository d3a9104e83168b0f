//! Per-device parameters loaded once at configuration time.
//!
//! [`DeviceParameters`] is the seam between a [`DeviceSlot`] and the
//! device-class specific data it needs before process data can flow. Motors
//! load eleven calibration values and, on the cyclic bus, a set of prebuilt
//! mailbox transactions; effectors and sensors carry nothing.
//!
//! Loading is all or nothing: a failed load yields an error and no value.
//!
//! [`DeviceSlot`]: crate::slot::DeviceSlot

use crate::mailbox::{MailboxHandle, MailboxOperation, MailboxTransaction};
use heapless::Vec as HVec;
use loong_common::bus::Bus;
use loong_common::consts::MOTOR_PARAMETER_COUNT;
use loong_common::descriptor::{CLEAR_ERROR_OBJECT, TEMPERATURE_OBJECT, TransportDescriptor};
use loong_common::provider::{ConfigProvider, MotorKey};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Value written to the fault-reset object to clear a drive error.
pub const CLEAR_ERROR_VALUE: i64 = 1;

/// Errors raised while loading parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    /// One or more calibration values are absent.
    #[error("missing parameter(s) for alias {alias}: {}", MissingKeys(keys))]
    Missing {
        /// Motor alias.
        alias: u16,
        /// Keys without a value, in load order.
        keys: HVec<MotorKey, MOTOR_PARAMETER_COUNT>,
    },

    /// The descriptor table has no entry for a required object.
    #[error("no {object} descriptor for {device_type} on {bus}")]
    MissingDescriptor {
        /// Bus the device sits on.
        bus: Bus,
        /// Device type looked up in the table.
        device_type: String,
        /// Logical object name.
        object: &'static str,
    },
}

struct MissingKeys<'a>(&'a [MotorKey]);

impl fmt::Display for MissingKeys<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(key.as_str())?;
        }
        Ok(())
    }
}

/// Parameters a device slot loads during `configure`.
pub trait DeviceParameters: Sized {
    /// Load the parameters of the device `alias` of type `device_type`.
    ///
    /// # Errors
    ///
    /// Any [`ParameterError`]; nothing is retained on failure.
    fn load(
        bus: Bus,
        alias: u16,
        device_type: &str,
        handle: MailboxHandle,
        provider: &dyn ConfigProvider,
    ) -> Result<Self, ParameterError>;
}

/// Prebuilt mailbox transactions of a motor drive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorMailbox {
    /// Generic write template (addressing zeroed).
    pub write_template: MailboxTransaction,
    /// Temperature read.
    pub temperature: MailboxTransaction,
    /// Fault reset write.
    pub clear_error: MailboxTransaction,
}

impl MotorMailbox {
    fn build(
        bus: Bus,
        alias: u16,
        device_type: &str,
        handle: MailboxHandle,
        provider: &dyn ConfigProvider,
    ) -> Result<Self, ParameterError> {
        let lookup = |object: &'static str| {
            provider
                .transport_descriptor(bus, device_type, object)
                .ok_or_else(|| ParameterError::MissingDescriptor {
                    bus,
                    device_type: device_type.to_string(),
                    object,
                })
        };
        let temperature = lookup(TEMPERATURE_OBJECT)?;
        let clear_error = lookup(CLEAR_ERROR_OBJECT)?;

        let write_template = MailboxTransaction::template(handle, alias);
        Ok(Self {
            write_template,
            temperature: write_template.with_descriptor(temperature, MailboxOperation::Read, 0),
            clear_error: write_template.with_descriptor(
                clear_error,
                MailboxOperation::Write,
                CLEAR_ERROR_VALUE,
            ),
        })
    }

    /// Transaction on an arbitrary object, built from the write template.
    pub fn request(
        &self,
        descriptor: TransportDescriptor,
        operation: MailboxOperation,
        value: i64,
    ) -> MailboxTransaction {
        self.write_template
            .with_descriptor(descriptor, operation, value)
    }
}

/// Calibration of one motor drive.
#[derive(Debug, Clone, PartialEq)]
pub struct MotorParameters {
    /// +1 or -1: direction of the joint relative to the encoder.
    pub polarity: f32,
    /// Encoder count at the joint zero position.
    pub count_bias: f32,
    /// Encoder counts per motor revolution.
    pub encoder_resolution: f32,
    /// Gear ratio applied to torque.
    pub gear_ratio_tor: f32,
    /// Gear ratio applied to position and velocity.
    pub gear_ratio_pos_vel: f32,
    /// Rated current in amperes.
    pub rated_current: f32,
    /// Torque constant in Nm/A.
    pub torque_constant: f32,
    /// Rated torque in Nm.
    pub rated_torque: f32,
    /// Maximum torque in per-mille of rated torque.
    pub maximum_torque: f32,
    /// Lower joint limit in radians.
    pub minimum_position: f32,
    /// Upper joint limit in radians.
    pub maximum_position: f32,
    /// Prebuilt mailbox transactions; only on the cyclic bus.
    pub mailbox: Option<MotorMailbox>,
}

impl DeviceParameters for MotorParameters {
    fn load(
        bus: Bus,
        alias: u16,
        device_type: &str,
        handle: MailboxHandle,
        provider: &dyn ConfigProvider,
    ) -> Result<Self, ParameterError> {
        let mut values = [0.0f32; MOTOR_PARAMETER_COUNT];
        let mut missing = HVec::new();
        for (value, key) in values.iter_mut().zip(MotorKey::ALL) {
            match provider.motor_parameter(alias, key) {
                Some(v) => *value = v,
                // ALL has MOTOR_PARAMETER_COUNT entries, so this cannot overflow.
                None => {
                    let _ = missing.push(key);
                }
            }
        }
        if !missing.is_empty() {
            warn!(%bus, alias, count = missing.len(), "Motor calibration incomplete");
            return Err(ParameterError::Missing {
                alias,
                keys: missing,
            });
        }

        // CAN and RS485 motors have no mailbox path yet.
        let mailbox = if bus.is_cyclic() {
            Some(MotorMailbox::build(bus, alias, device_type, handle, provider)?)
        } else {
            None
        };

        let [
            polarity,
            count_bias,
            encoder_resolution,
            gear_ratio_tor,
            gear_ratio_pos_vel,
            rated_current,
            torque_constant,
            rated_torque,
            maximum_torque,
            minimum_position,
            maximum_position,
        ] = values;

        debug!(%bus, alias, mailbox = mailbox.is_some(), "Motor parameters loaded");

        Ok(Self {
            polarity,
            count_bias,
            encoder_resolution,
            gear_ratio_tor,
            gear_ratio_pos_vel,
            rated_current,
            torque_constant,
            rated_torque,
            maximum_torque,
            minimum_position,
            maximum_position,
            mailbox,
        })
    }
}

/// Parameters of hands, digits and converters (none).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectorParameters;

impl DeviceParameters for EffectorParameters {
    fn load(
        _bus: Bus,
        _alias: u16,
        _device_type: &str,
        _handle: MailboxHandle,
        _provider: &dyn ConfigProvider,
    ) -> Result<Self, ParameterError> {
        Ok(Self)
    }
}

/// Parameters of force sensors (none).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorParameters;

impl DeviceParameters for SensorParameters {
    fn load(
        _bus: Bus,
        _alias: u16,
        _device_type: &str,
        _handle: MailboxHandle,
        _provider: &dyn ConfigProvider,
    ) -> Result<Self, ParameterError> {
        Ok(Self)
    }
}
