//! Device slot: identity, lifecycle and process-data views of one device.
//!
//! # Lifecycle
//!
//! ```text
//!   Uninitialized ──init()──► Initialized ──configure()──► Configured
//!                                 ▲   │
//!                                 └───┘ identity mismatch / load failure
//! ```
//!
//! `init` records where the device sits on the bus and where its process
//! data lives in the domain image. `configure` is called once the bus has
//! been enumerated: it checks that the slot is the one being wired, loads
//! the device's parameters and attaches both views to the domain's swap
//! buffers. Each step succeeds at most once.
//!
//! # Result codes
//!
//! [`SlotError::code`] maps errors to the numeric codes callers report:
//!
//! | Code | Meaning                                      |
//! |------|----------------------------------------------|
//! | -1   | already initialised/configured, load failure |
//! | 1    | identity mismatch                            |
//! | 2    | not yet initialised                          |

use crate::mailbox::MailboxHandle;
use crate::parameters::{
    DeviceParameters, EffectorParameters, MotorParameters, ParameterError, SensorParameters,
};
use crate::swap::SwapBuffer;
use crate::view::{TypedView, ViewError};
use bytemuck::Pod;
use loong_common::bus::Bus;
use loong_common::pdo::{
    ConverterRxData, ConverterTxData, DigitRxData, DigitTxData, DriverRxData, DriverTxData,
    HandRxData, HandTxData, SensorRxData, SensorTxData,
};
use loong_common::provider::ConfigProvider;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Where a device sits on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    /// Bus the device is attached to.
    pub bus: Bus,
    /// Master (bus instance) order.
    pub order: u32,
    /// Domain holding the device's process data.
    pub domain: u32,
    /// Bus-local slave position.
    pub slave: u16,
    /// Device alias.
    pub alias: u16,
    /// Device type name.
    pub device_type: String,
}

impl DeviceIdentity {
    /// Whether the device is the one wired at `bus`/`order`/`domain`.
    #[inline]
    pub fn matches(&self, bus: Bus, order: u32, domain: u32) -> bool {
        self.bus == bus && self.order == order && self.domain == domain
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} domain {} alias {} ({})",
            self.bus, self.order, self.slave, self.domain, self.alias, self.device_type
        )
    }
}

/// Lifecycle state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// No identity yet.
    Uninitialized,
    /// Identity and offsets recorded; views still private.
    Initialized,
    /// Views attached to the domain buffers and parameters loaded.
    Configured,
}

/// Slot lifecycle errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SlotError {
    /// `init` on a slot that already has an identity.
    #[error("slot already initialised as {0}")]
    AlreadyInitialized(Box<DeviceIdentity>),

    /// `configure` on a slot that already finished configuration.
    #[error("slot alias {alias} on {bus} already configured")]
    AlreadyConfigured {
        /// Slot's bus.
        bus: Bus,
        /// Slot's alias.
        alias: u16,
    },

    /// `configure` before `init`.
    #[error("slot not yet initialised")]
    NotInitialized,

    /// `configure` for a bus position the slot does not occupy.
    #[error(
        "identity mismatch: slot is {bus} {order} domain {domain}, \
         configure targeted {target_bus} {target_order} domain {target_domain}"
    )]
    IdentityMismatch {
        /// Slot's bus.
        bus: Bus,
        /// Slot's master index.
        order: u32,
        /// Slot's domain.
        domain: u32,
        /// Bus `configure` was called for.
        target_bus: Bus,
        /// Master index `configure` was called for.
        target_order: u32,
        /// Domain `configure` was called for.
        target_domain: u32,
    },

    /// Parameter loading failed.
    #[error("parameter load failed for alias {alias} on {bus}: {source}")]
    ParameterLoad {
        /// Slot's bus.
        bus: Bus,
        /// Slot's alias.
        alias: u16,
        /// Underlying load failure.
        #[source]
        source: ParameterError,
    },

    /// A view offset does not fit the domain image.
    #[error("process-data view rejected for alias {alias} on {bus}: {source}")]
    View {
        /// Slot's bus.
        bus: Bus,
        /// Slot's alias.
        alias: u16,
        /// Rejected view.
        #[source]
        source: ViewError,
    },
}

impl SlotError {
    /// Numeric result code.
    pub fn code(&self) -> i32 {
        match self {
            Self::IdentityMismatch { .. } => 1,
            Self::NotInitialized => 2,
            Self::AlreadyInitialized(_)
            | Self::AlreadyConfigured { .. }
            | Self::ParameterLoad { .. }
            | Self::View { .. } => -1,
        }
    }
}

/// Identity, parameters and rx/tx views of one device.
///
/// `Rx` is the master → device layout, `Tx` the device → master layout.
pub struct DeviceSlot<Rx: Pod, Tx: Pod, P: DeviceParameters> {
    identity: Option<DeviceIdentity>,
    handle: MailboxHandle,
    rx: TypedView<Rx>,
    tx: TypedView<Tx>,
    parameters: Option<P>,
    enabled: bool,
}

impl<Rx: Pod, Tx: Pod, P: DeviceParameters> DeviceSlot<Rx, Tx, P> {
    /// Create an uninitialised slot with private views.
    pub fn new() -> Self {
        Self {
            identity: None,
            handle: MailboxHandle::default(),
            rx: TypedView::new(),
            tx: TypedView::new(),
            parameters: None,
            enabled: false,
        }
    }

    /// Lifecycle state.
    pub fn state(&self) -> SlotState {
        match (&self.identity, &self.parameters) {
            (None, _) => SlotState::Uninitialized,
            (Some(_), None) => SlotState::Initialized,
            (Some(_), Some(_)) => SlotState::Configured,
        }
    }

    /// Record identity, view offsets and mailbox handle.
    ///
    /// # Errors
    ///
    /// [`SlotError::AlreadyInitialized`] if called twice; the slot is left
    /// untouched.
    pub fn init(
        &mut self,
        identity: DeviceIdentity,
        rx_offset: usize,
        tx_offset: usize,
        handle: MailboxHandle,
    ) -> Result<(), SlotError> {
        if let Some(existing) = &self.identity {
            warn!(%existing, "Rejected repeated slot init");
            return Err(SlotError::AlreadyInitialized(Box::new(existing.clone())));
        }
        let view_error = |source| SlotError::View {
            bus: identity.bus,
            alias: identity.alias,
            source,
        };
        self.rx.bind(rx_offset).map_err(view_error)?;
        self.tx.bind(tx_offset).map_err(view_error)?;
        self.handle = handle;
        info!(%identity, rx_offset, tx_offset, %handle, "Device slot initialised");
        self.identity = Some(identity);
        Ok(())
    }

    /// Wire the slot to its domain once the bus is enumerated.
    ///
    /// Checks identity, loads parameters through `provider`, then attaches
    /// the rx view to `rx_buffer` and the tx view to `tx_buffer`. On any
    /// error the slot stays [`SlotState::Initialized`] with its views
    /// private.
    ///
    /// # Errors
    ///
    /// See [`SlotError`]; [`SlotError::code`] gives the numeric code.
    pub fn configure(
        &mut self,
        bus: Bus,
        order: u32,
        domain: u32,
        rx_buffer: Arc<SwapBuffer>,
        tx_buffer: Arc<SwapBuffer>,
        provider: &dyn ConfigProvider,
    ) -> Result<(), SlotError> {
        let identity = self.identity.as_ref().ok_or(SlotError::NotInitialized)?;
        if self.parameters.is_some() {
            return Err(SlotError::AlreadyConfigured {
                bus: identity.bus,
                alias: identity.alias,
            });
        }
        if !identity.matches(bus, order, domain) {
            return Err(SlotError::IdentityMismatch {
                bus: identity.bus,
                order: identity.order,
                domain: identity.domain,
                target_bus: bus,
                target_order: order,
                target_domain: domain,
            });
        }

        let view_error = |source| SlotError::View {
            bus: identity.bus,
            alias: identity.alias,
            source,
        };
        self.rx.check_fits(&rx_buffer).map_err(view_error)?;
        self.tx.check_fits(&tx_buffer).map_err(view_error)?;

        let parameters = P::load(
            identity.bus,
            identity.alias,
            &identity.device_type,
            self.handle,
            provider,
        )
        .map_err(|source| {
            error!(bus = %identity.bus, alias = identity.alias, %source, "Parameter load failed");
            SlotError::ParameterLoad {
                bus: identity.bus,
                alias: identity.alias,
                source,
            }
        })?;

        self.rx.attach(rx_buffer).map_err(view_error)?;
        self.tx.attach(tx_buffer).map_err(view_error)?;
        info!(%identity, "Device slot configured");
        self.parameters = Some(parameters);
        Ok(())
    }

    /// Identity recorded by `init`.
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Mailbox handle recorded by `init`.
    pub fn handle(&self) -> MailboxHandle {
        self.handle
    }

    /// Parameters loaded by `configure`.
    pub fn parameters(&self) -> Option<&P> {
        self.parameters.as_ref()
    }

    /// Master → device data.
    pub fn rx(&self) -> &TypedView<Rx> {
        &self.rx
    }

    /// Master → device data, writable.
    pub fn rx_mut(&mut self) -> &mut TypedView<Rx> {
        &mut self.rx
    }

    /// Device → master data.
    pub fn tx(&self) -> &TypedView<Tx> {
        &self.tx
    }

    /// Device → master data, writable (before wiring, for tests and staging).
    pub fn tx_mut(&mut self) -> &mut TypedView<Tx> {
        &mut self.tx
    }

    /// Whether the application enabled the device.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the device; only valid after `init`.
    pub fn set_enabled(&mut self, enabled: bool) -> Result<(), SlotError> {
        if self.identity.is_none() {
            return Err(SlotError::NotInitialized);
        }
        self.enabled = enabled;
        Ok(())
    }
}

impl<Rx: Pod, Tx: Pod, P: DeviceParameters> Default for DeviceSlot<Rx, Tx, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Rx: Pod, Tx: Pod, P: DeviceParameters> fmt::Debug for DeviceSlot<Rx, Tx, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSlot")
            .field("identity", &self.identity)
            .field("state", &self.state())
            .field("handle", &self.handle)
            .field("enabled", &self.enabled)
            .finish()
    }
}

// ─── Device classes ─────────────────────────────────────────────────

/// Joint motor drive.
pub type MotorSlot = DeviceSlot<DriverRxData, DriverTxData, MotorParameters>;
/// Dexterous hand.
pub type HandSlot = DeviceSlot<HandRxData, HandTxData, EffectorParameters>;
/// Digit actuator.
pub type DigitSlot = DeviceSlot<DigitRxData, DigitTxData, EffectorParameters>;
/// ADC converter.
pub type ConverterSlot = DeviceSlot<ConverterRxData, ConverterTxData, SensorParameters>;
/// Force/torque sensor.
pub type SensorSlot = DeviceSlot<SensorRxData, SensorTxData, SensorParameters>;
