//! Process-data layouts exchanged with field devices every cycle.
//!
//! Each device class has an rx structure (master → device, "targets") and a
//! tx structure (device → master, "actuals"). The structures mirror the
//! device PDO mapping byte for byte and are overlaid on the domain image by
//! the driver's typed views.
//!
//! All structs are `#[repr(C, packed)]`: the fieldbus master assigns byte
//! offsets without regard to alignment, so the overlays must be valid at any
//! address. Fields of packed structs cannot be borrowed; copy them out
//! (`let pos = { data.actual_position };`) before comparing.
//!
//! | Class      | Rx struct         | Tx struct         | Rx bytes | Tx bytes |
//! |------------|-------------------|-------------------|----------|----------|
//! | Motor      | `DriverRxData`    | `DriverTxData`    | 20       | 16       |
//! | Hand       | `HandRxData`      | `HandTxData`      | 38       | 64       |
//! | Digit      | `DigitRxData`     | `DigitTxData`     | 2        | 2        |
//! | Converter  | `ConverterRxData` | `ConverterTxData` | 560      | 560      |
//! | Sensor     | `SensorRxData`    | `SensorTxData`    | 32       | 36       |

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// Number of actuated joints on the dexterous hand.
///
/// Order: thumb, thumb bend, forefinger, middle, ring, little.
pub const HAND_JOINTS: usize = 6;

/// Number of fingers carrying touch sensors.
///
/// Order: thumb, forefinger, middle, ring, little.
pub const HAND_TOUCH_FINGERS: usize = 5;

/// Touch sensing cells per finger.
pub const HAND_TOUCH_CELLS: usize = 4;

/// Channels per ADC converter.
pub const CONVERTER_CHANNELS: usize = 8;

/// Payload bytes per converter channel.
pub const CONVERTER_PAYLOAD: usize = 64;

// ─── Motor drive ────────────────────────────────────────────────────

/// Motor drive targets (CiA 402 style rx PDO).
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct DriverRxData {
    /// Target position in encoder counts.
    pub target_position: i32,
    /// Target velocity in counts per second.
    pub target_velocity: i32,
    /// Target torque in per-mille of rated torque.
    pub target_torque: i16,
    /// Control word.
    pub control_word: u16,
    /// Mode of operation.
    pub mode: i8,
    /// Unused padding byte of the PDO mapping.
    pub reserved: i8,
    /// Torque feed-forward offset.
    pub torque_offset: i16,
    /// Velocity feed-forward offset.
    pub velocity_offset: i32,
}

/// Motor drive actuals (CiA 402 style tx PDO).
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct DriverTxData {
    /// Actual position in encoder counts.
    pub actual_position: i32,
    /// Actual velocity in counts per second.
    pub actual_velocity: i32,
    /// Actual torque in per-mille of rated torque.
    pub actual_torque: i16,
    /// Status word.
    pub status_word: u16,
    /// Mode of operation display.
    pub mode_display: i8,
    /// Unused padding byte of the PDO mapping.
    pub reserved: i8,
    /// Drive error code.
    pub error_code: u16,
}

// ─── Dexterous hand ─────────────────────────────────────────────────

/// Dexterous hand targets.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct HandRxData {
    /// Non-zero halts all joints.
    pub stop: u8,
    /// Unused padding byte of the PDO mapping.
    pub reserved: i8,
    /// Per-joint target speed.
    pub target_speed: [u16; HAND_JOINTS],
    /// Per-joint target angle.
    pub target_angle: [u16; HAND_JOINTS],
    /// Per-joint current limit.
    pub current_limit: [u16; HAND_JOINTS],
}

/// Dexterous hand actuals.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct HandTxData {
    /// Touch sensor cells per finger.
    pub touch: [[u16; HAND_TOUCH_CELLS]; HAND_TOUCH_FINGERS],
    /// Per-joint actual angle.
    pub actual_angle: [u16; HAND_JOINTS],
    /// Per-joint actual current.
    pub actual_current: [u16; HAND_JOINTS],
}

// ─── Digit actuator ─────────────────────────────────────────────────

/// Digit actuator target.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct DigitRxData {
    /// Target position.
    pub target_position: u16,
}

/// Digit actuator actual.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct DigitTxData {
    /// Actual position.
    pub actual_position: u16,
}

// ─── ADC converter ──────────────────────────────────────────────────

/// One converter channel frame.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct ConverterDatum {
    /// Channel index.
    pub index: u16,
    /// Frame identifier.
    pub id: u16,
    /// Number of valid bytes in `data`.
    pub length: u16,
    /// Frame payload.
    pub data: [u8; CONVERTER_PAYLOAD],
}

impl ConverterDatum {
    /// Valid payload bytes, clamped to the buffer size.
    pub fn payload(&self) -> &[u8] {
        let len = (self.length as usize).min(CONVERTER_PAYLOAD);
        &self.data[..len]
    }
}

/// Converter outgoing frames.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct ConverterRxData {
    /// Per-channel frames.
    pub channels: [ConverterDatum; CONVERTER_CHANNELS],
}

/// Converter incoming frames.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct ConverterTxData {
    /// Per-channel frames.
    pub channels: [ConverterDatum; CONVERTER_CHANNELS],
}

// ─── Force/torque sensor ────────────────────────────────────────────

/// Force sensor commands (calibration coefficients).
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct SensorRxData {
    /// Sensor control code.
    pub control_code: i32,
    /// Calibration coefficient X.
    pub x: f32,
    /// Calibration coefficient Y.
    pub y: f32,
    /// Calibration coefficient Z.
    pub z: f32,
    /// Calibration coefficient A.
    pub a: f32,
    /// Calibration coefficient B.
    pub b: f32,
    /// Calibration coefficient C.
    pub c: f32,
    /// Calibration coefficient D.
    pub d: f32,
}

/// Force sensor readings.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C, packed)]
pub struct SensorTxData {
    /// Forces along x, y, z in raw sensor units.
    pub force: [i32; 3],
    /// Moments about x, y, z in raw sensor units.
    pub moment: [i32; 3],
    /// Sensor status code.
    pub status_code: u32,
    /// Free-running sample counter.
    pub sample_counter: u32,
    /// Sensor temperature.
    pub temperature: i32,
}

// ─── Default via zeroed() ───────────────────────────────────────────
//
// Zero is a valid value for every field of every layout; arrays longer than
// 32 elements have no derived `Default`.

macro_rules! impl_default_zeroed {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Default for $ty {
                fn default() -> Self {
                    Zeroable::zeroed()
                }
            }
        )*
    };
}

impl_default_zeroed!(
    DriverRxData,
    DriverTxData,
    HandRxData,
    HandTxData,
    DigitRxData,
    DigitTxData,
    ConverterDatum,
    ConverterRxData,
    ConverterTxData,
    SensorRxData,
    SensorTxData,
);

const_assert_eq!(core::mem::size_of::<DriverRxData>(), 20);
const_assert_eq!(core::mem::size_of::<DriverTxData>(), 16);
const_assert_eq!(core::mem::size_of::<HandRxData>(), 38);
const_assert_eq!(core::mem::size_of::<HandTxData>(), 64);
const_assert_eq!(core::mem::size_of::<DigitRxData>(), 2);
const_assert_eq!(core::mem::size_of::<DigitTxData>(), 2);
const_assert_eq!(core::mem::size_of::<ConverterDatum>(), 70);
const_assert_eq!(core::mem::size_of::<ConverterRxData>(), 560);
const_assert_eq!(core::mem::size_of::<ConverterTxData>(), 560);
const_assert_eq!(core::mem::size_of::<SensorRxData>(), 32);
const_assert_eq!(core::mem::size_of::<SensorTxData>(), 36);
const_assert_eq!(core::mem::align_of::<DriverRxData>(), 1);
const_assert_eq!(core::mem::align_of::<ConverterTxData>(), 1);
