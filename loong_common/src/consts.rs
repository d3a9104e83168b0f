//! Workspace-wide constants.
//!
//! Single source of truth for cycle timing, swap-buffer geometry and
//! mailbox channel limits. Imported by all crates.

/// Number of blocks in every swap buffer (triple buffering).
pub const SWAP_SLOTS: usize = 3;

/// Default cycle time in microseconds (1 kHz).
pub const DEFAULT_CYCLE_TIME_US: u32 = 1000;

/// Default number of transactions in a mailbox channel pool.
pub const DEFAULT_MAILBOX_POOL_SIZE: usize = 32;

/// Default number of new mailbox transactions started per cycle.
///
/// The cyclic transport only keeps a handful of mailbox operations in
/// flight, so the cycle thread starts them one or two at a time.
pub const DEFAULT_MAILBOX_STARTS_PER_CYCLE: usize = 2;

/// Default number of cycles before an unanswered transaction fails.
pub const DEFAULT_MAILBOX_TIMEOUT_CYCLES: u32 = 1000;

/// Upper bound on transactions a servicer keeps in flight at once.
pub const MAX_MAILBOX_IN_FLIGHT: usize = 16;

/// Upper bound on the mailbox pool size (slot indices are `u16`).
pub const MAX_MAILBOX_POOL_SIZE: usize = 4096;

/// Number of calibration scalars every motor must provide.
pub const MOTOR_PARAMETER_COUNT: usize = 11;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/loong/driver.toml";
