//! Simulated bus: domain layout, device models and the cycle loop.
//!
//! [`SimBus`] stands in for a fieldbus master. It lays the configured
//! devices out in per-domain process images, owns the [`Domain`] swap
//! buffers and a [`LoopbackTransport`], and each cycle:
//!
//! 1. exchanges every domain (latest committed rx snapshot out, incoming tx
//!    frame in),
//! 2. lets each simulated device answer its rx data with tx data for the
//!    next cycle,
//! 3. services the mailbox channel against the loopback transport.
//!
//! Device slots are wired to the bus with [`SimBus::wire`], which runs the
//! usual `init`/`configure` sequence on each slot.

use crate::channel::{MailboxServicer, ServiceReport};
use crate::domain::Domain;
use crate::loopback::LoopbackTransport;
use crate::mailbox::MailboxHandle;
use crate::parameters::DeviceParameters;
use crate::slot::{
    ConverterSlot, DeviceIdentity, DeviceSlot, DigitSlot, HandSlot, MotorSlot, SensorSlot,
    SlotError,
};
use crate::swap::SwapError;
use bytemuck::Pod;
use loong_common::bus::Bus;
use loong_common::descriptor::{CLEAR_ERROR_OBJECT, TEMPERATURE_OBJECT};
use loong_common::driver_config::{DeviceClass, DeviceEntry, DriverConfig};
use loong_common::pdo::{
    ConverterRxData, ConverterTxData, DigitRxData, DigitTxData, DriverRxData, DriverTxData,
    HandRxData, HandTxData, SensorRxData, SensorTxData,
};
use loong_common::provider::ConfigProvider;
use std::collections::BTreeMap;
use std::mem::size_of;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Control word value that enables a simulated drive.
pub const CONTROL_ENABLE: u16 = 0x000F;
/// Status word reported by an enabled drive (operation enabled).
pub const STATUS_OPERATION_ENABLED: u16 = 0x0237;
/// Status word reported by a disabled drive (switch on disabled).
pub const STATUS_SWITCH_ON_DISABLED: u16 = 0x0250;
/// Temperature reported by simulated drives, before the alias offset.
pub const SIM_BASE_TEMPERATURE: i64 = 30;

/// Rx and tx image sizes of a device class.
pub const fn class_sizes(class: DeviceClass) -> (usize, usize) {
    match class {
        DeviceClass::Motor => (size_of::<DriverRxData>(), size_of::<DriverTxData>()),
        DeviceClass::Hand => (size_of::<HandRxData>(), size_of::<HandTxData>()),
        DeviceClass::Digit => (size_of::<DigitRxData>(), size_of::<DigitTxData>()),
        DeviceClass::Converter => (size_of::<ConverterRxData>(), size_of::<ConverterTxData>()),
        DeviceClass::Sensor => (size_of::<SensorRxData>(), size_of::<SensorTxData>()),
    }
}

/// Where one device's process data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePlacement {
    /// Configured device.
    pub entry: DeviceEntry,
    /// Mailbox handle assigned to the device.
    pub handle: MailboxHandle,
    /// Byte offset of the rx data in the domain's rx image.
    pub rx_offset: usize,
    /// Byte offset of the tx data in the domain's tx image.
    pub tx_offset: usize,
}

impl DevicePlacement {
    /// Identity a slot for this device is initialised with.
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            bus: self.entry.bus,
            order: self.entry.order,
            domain: self.entry.domain,
            slave: self.entry.slave,
            alias: self.entry.alias,
            device_type: self.entry.device_type.clone(),
        }
    }
}

/// Packed placement of devices into domains, in configuration order.
///
/// Returns the placements and the (rx, tx) image size of every domain.
pub fn layout(devices: &[DeviceEntry]) -> (Vec<DevicePlacement>, BTreeMap<u32, (usize, usize)>) {
    let mut sizes: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    let placements = devices
        .iter()
        .enumerate()
        .map(|(n, entry)| {
            let (rx, tx) = class_sizes(entry.class);
            let image = sizes.entry(entry.domain).or_default();
            let placement = DevicePlacement {
                entry: entry.clone(),
                handle: MailboxHandle(n as u32),
                rx_offset: image.0,
                tx_offset: image.1,
            };
            image.0 += rx;
            image.1 += tx;
            placement
        })
        .collect();
    (placements, sizes)
}

/// A wired device slot of any class.
#[derive(Debug)]
pub enum SimDevice {
    /// Joint motor driver.
    Motor(MotorSlot),
    /// Dexterous hand.
    Hand(HandSlot),
    /// Digital IO module.
    Digit(DigitSlot),
    /// Analog converter.
    Converter(ConverterSlot),
    /// Force/torque or IMU sensor.
    Sensor(SensorSlot),
}

/// Errors raised while wiring slots to the simulated bus.
#[derive(Debug, Error)]
pub enum SimError {
    /// A device names a domain the bus did not lay out.
    #[error("device alias {alias} names unknown domain {domain}")]
    UnknownDomain {
        /// Requested domain.
        domain: u32,
        /// Device alias.
        alias: u16,
    },

    /// A slot rejected `init` or `configure`.
    #[error(transparent)]
    Slot(#[from] SlotError),
}

impl SimDevice {
    /// Identity of the wrapped slot.
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        match self {
            Self::Motor(slot) => slot.identity(),
            Self::Hand(slot) => slot.identity(),
            Self::Digit(slot) => slot.identity(),
            Self::Converter(slot) => slot.identity(),
            Self::Sensor(slot) => slot.identity(),
        }
    }

    /// The motor slot, if this is a motor.
    pub fn as_motor_mut(&mut self) -> Option<&mut MotorSlot> {
        match self {
            Self::Motor(slot) => Some(slot),
            _ => None,
        }
    }
}

struct DomainFrames {
    domain: Domain,
    outgoing: Vec<u8>,
    incoming: Vec<u8>,
}

/// Timing statistics of the cycle loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingStats {
    /// Cycles executed.
    pub cycle_count: u64,
    /// Cycles that exceeded the cycle time.
    pub timing_violations: u64,
    /// Longest observed cycle.
    pub max_cycle_time_us: u64,
    /// Sum of cycle times, for averages.
    pub total_cycle_time_us: u64,
}

/// In-process stand-in for a fieldbus master.
pub struct SimBus {
    placements: Vec<DevicePlacement>,
    domains: Vec<DomainFrames>,
    transport: LoopbackTransport,
    cycle_time: Duration,
    running: Arc<AtomicBool>,
    stats: TimingStats,
}

impl SimBus {
    /// Lay out the configured devices and seed their mailboxes.
    ///
    /// Every ECAT motor gets a temperature object and a fault-reset object
    /// at the addresses the descriptor table gives for its device type.
    pub fn new(config: &DriverConfig, ack_latency: u32) -> Self {
        let (placements, sizes) = layout(&config.devices);
        let domains = sizes
            .into_iter()
            .map(|(id, (rx, tx))| DomainFrames {
                domain: Domain::new(id, rx, tx),
                outgoing: vec![0; rx],
                incoming: vec![0; tx],
            })
            .collect::<Vec<_>>();

        let mut transport = LoopbackTransport::new(placements.len(), ack_latency);
        for placement in &placements {
            let entry = &placement.entry;
            if entry.class != DeviceClass::Motor || !entry.bus.is_cyclic() {
                continue;
            }
            let temperature = SIM_BASE_TEMPERATURE + i64::from(entry.alias % 10);
            for (object, value) in [(TEMPERATURE_OBJECT, temperature), (CLEAR_ERROR_OBJECT, 0)] {
                let Some(desc) = config.transport_descriptor(entry.bus, &entry.device_type, object)
                else {
                    continue;
                };
                // Handles are dense over `placements`, so the insert cannot miss.
                let _ = transport.insert_object(
                    placement.handle,
                    desc.index,
                    desc.subindex,
                    desc.bit_length.encode(value),
                );
            }
        }

        info!(
            devices = placements.len(),
            domains = domains.len(),
            cycle_time_us = config.cycle.cycle_time_us,
            "Simulated bus created"
        );

        Self {
            placements,
            domains,
            transport,
            cycle_time: Duration::from_micros(u64::from(config.cycle.cycle_time_us)),
            running: Arc::new(AtomicBool::new(false)),
            stats: TimingStats::default(),
        }
    }

    /// Device placements in configuration order.
    pub fn placements(&self) -> &[DevicePlacement] {
        &self.placements
    }

    /// Domain `id`, if any device lives in it.
    pub fn domain(&self, id: u32) -> Option<&Domain> {
        self.domains
            .iter()
            .map(|frames| &frames.domain)
            .find(|domain| domain.id() == id)
    }

    /// Every laid-out domain, in domain order.
    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.domains.iter().map(|frames| &frames.domain)
    }

    /// Loopback transport answering the mailboxes.
    pub fn transport_mut(&mut self) -> &mut LoopbackTransport {
        &mut self.transport
    }

    /// Flag that keeps [`run`](Self::run) looping; clear it to stop.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Timing statistics.
    pub fn stats(&self) -> TimingStats {
        self.stats
    }

    /// Build, initialise and configure a slot for every placed device.
    ///
    /// # Errors
    ///
    /// The first [`SimError`] any slot reports.
    pub fn wire(&self, provider: &dyn ConfigProvider) -> Result<Vec<SimDevice>, SimError> {
        self.placements
            .iter()
            .map(|placement| -> Result<SimDevice, SimError> {
                Ok(match placement.entry.class {
                    DeviceClass::Motor => SimDevice::Motor(self.wire_slot(placement, provider)?),
                    DeviceClass::Hand => SimDevice::Hand(self.wire_slot(placement, provider)?),
                    DeviceClass::Digit => SimDevice::Digit(self.wire_slot(placement, provider)?),
                    DeviceClass::Converter => {
                        SimDevice::Converter(self.wire_slot(placement, provider)?)
                    }
                    DeviceClass::Sensor => SimDevice::Sensor(self.wire_slot(placement, provider)?),
                })
            })
            .collect()
    }

    fn wire_slot<Rx: Pod, Tx: Pod, P: DeviceParameters>(
        &self,
        placement: &DevicePlacement,
        provider: &dyn ConfigProvider,
    ) -> Result<DeviceSlot<Rx, Tx, P>, SimError> {
        let entry = &placement.entry;
        let mut slot = DeviceSlot::new();
        slot.init(
            placement.identity(),
            placement.rx_offset,
            placement.tx_offset,
            placement.handle,
        )?;
        let domain = self
            .domain(entry.domain)
            .ok_or(SimError::UnknownDomain {
                domain: entry.domain,
                alias: entry.alias,
            })?;
        slot.configure(
            entry.bus,
            entry.order,
            entry.domain,
            Arc::clone(domain.rx()),
            Arc::clone(domain.tx()),
            provider,
        )?;
        Ok(slot)
    }

    /// Run one cycle.
    ///
    /// # Errors
    ///
    /// [`SwapError`] if a domain frame does not match its buffers.
    pub fn cycle(&mut self, servicer: &mut MailboxServicer) -> Result<ServiceReport, SwapError> {
        for frames in &mut self.domains {
            frames
                .domain
                .exchange(&mut frames.outgoing, &frames.incoming)?;
        }
        let cycle = self.stats.cycle_count;
        for placement in &self.placements {
            let Some(frames) = self
                .domains
                .iter_mut()
                .find(|frames| frames.domain.id() == placement.entry.domain)
            else {
                continue;
            };
            respond(placement, &frames.outgoing, &mut frames.incoming, cycle);
        }
        Ok(servicer.service(&mut self.transport))
    }

    /// Run cycles at the configured period until the running flag clears
    /// or `max_cycles` have run.
    ///
    /// # Errors
    ///
    /// The first [`SwapError`] a cycle reports.
    pub fn run(
        &mut self,
        servicer: &mut MailboxServicer,
        max_cycles: Option<u64>,
    ) -> Result<TimingStats, SwapError> {
        info!(
            "Starting cycle loop (cycle_time={}us)",
            self.cycle_time.as_micros()
        );
        self.running.store(true, Ordering::SeqCst);
        let target_us = self.cycle_time.as_micros() as u64;

        while self.running.load(Ordering::SeqCst)
            && max_cycles.is_none_or(|max| self.stats.cycle_count < max)
        {
            let cycle_start = Instant::now();
            self.cycle(servicer)?;

            let cycle_time_us = cycle_start.elapsed().as_micros() as u64;
            self.stats.cycle_count += 1;
            self.stats.total_cycle_time_us += cycle_time_us;
            self.stats.max_cycle_time_us = self.stats.max_cycle_time_us.max(cycle_time_us);
            if cycle_time_us > target_us {
                self.stats.timing_violations += 1;
                if self.stats.timing_violations <= 10 || self.stats.timing_violations % 1000 == 0 {
                    warn!(
                        "Timing violation #{}: cycle took {}us (target {}us)",
                        self.stats.timing_violations, cycle_time_us, target_us
                    );
                }
            }

            let elapsed = cycle_start.elapsed();
            if elapsed < self.cycle_time {
                std::thread::sleep(self.cycle_time - elapsed);
            }

            if self.stats.cycle_count % 1000 == 0 {
                debug!(
                    "Cycle loop: {} cycles, avg={}us, max={}us, violations={}",
                    self.stats.cycle_count,
                    self.stats.total_cycle_time_us / self.stats.cycle_count,
                    self.stats.max_cycle_time_us,
                    self.stats.timing_violations
                );
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(
            "Cycle loop stopped after {} cycles (violations: {})",
            self.stats.cycle_count, self.stats.timing_violations
        );
        Ok(self.stats)
    }
}

impl std::fmt::Debug for SimBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimBus")
            .field("devices", &self.placements.len())
            .field("domains", &self.domains.len())
            .field("cycle_time", &self.cycle_time)
            .field("stats", &self.stats)
            .finish()
    }
}

// ─── Device models ──────────────────────────────────────────────────

fn read_at<T: Pod>(image: &[u8], offset: usize) -> T {
    bytemuck::pod_read_unaligned(&image[offset..offset + size_of::<T>()])
}

fn write_at<T: Pod>(image: &mut [u8], offset: usize, value: &T) {
    image[offset..offset + size_of::<T>()].copy_from_slice(bytemuck::bytes_of(value));
}

/// Produce the tx data a device answers its rx data with.
fn respond(placement: &DevicePlacement, outgoing: &[u8], incoming: &mut [u8], cycle: u64) {
    let (rx, tx) = (placement.rx_offset, placement.tx_offset);
    match placement.entry.class {
        DeviceClass::Motor => {
            let target: DriverRxData = read_at(outgoing, rx);
            let enabled = { target.control_word } == CONTROL_ENABLE;
            let actual = DriverTxData {
                actual_position: if enabled { target.target_position } else { 0 },
                actual_velocity: if enabled { target.target_velocity } else { 0 },
                actual_torque: if enabled { target.target_torque } else { 0 },
                status_word: if enabled {
                    STATUS_OPERATION_ENABLED
                } else {
                    STATUS_SWITCH_ON_DISABLED
                },
                mode_display: target.mode,
                reserved: 0,
                error_code: 0,
            };
            write_at(incoming, tx, &actual);
        }
        DeviceClass::Hand => {
            let target: HandRxData = read_at(outgoing, rx);
            let mut actual: HandTxData = read_at(incoming, tx);
            let stopped = { target.stop } != 0;
            if !stopped {
                actual.actual_angle = target.target_angle;
            }
            write_at(incoming, tx, &actual);
        }
        DeviceClass::Digit => {
            let target: DigitRxData = read_at(outgoing, rx);
            let actual = DigitTxData {
                actual_position: target.target_position,
            };
            write_at(incoming, tx, &actual);
        }
        DeviceClass::Converter => {
            let target: ConverterRxData = read_at(outgoing, rx);
            let actual = ConverterTxData {
                channels: target.channels,
            };
            write_at(incoming, tx, &actual);
        }
        DeviceClass::Sensor => {
            let target: SensorRxData = read_at(outgoing, rx);
            let actual = SensorTxData {
                force: [0; 3],
                moment: [0; 3],
                status_code: target.control_code as u32,
                sample_counter: cycle as u32,
                temperature: SIM_BASE_TEMPERATURE as i32,
            };
            write_at(incoming, tx, &actual);
        }
    }
}

/// Devices on `bus` among `placements`.
pub fn count_on_bus(placements: &[DevicePlacement], bus: Bus) -> usize {
    placements.iter().filter(|p| p.entry.bus == bus).count()
}
