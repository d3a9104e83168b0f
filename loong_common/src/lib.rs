//! Loong Common Library
//!
//! Shared constants, process-data layouts and configuration loading for the
//! Loong driver workspace.
//!
//! # Module Structure
//!
//! - [`bus`] - Fieldbus transport identifiers
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Workspace-wide constants
//! - [`descriptor`] - Mailbox object addressing
//! - [`driver_config`] - `driver.toml` schema and validation
//! - [`pdo`] - Cyclic process-data layouts per device class
//! - [`provider`] - Calibration/descriptor provider trait
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use loong_common::prelude::*;
//! ```

#![deny(missing_docs)]

pub mod bus;
pub mod config;
pub mod consts;
pub mod descriptor;
pub mod driver_config;
pub mod pdo;
pub mod prelude;
pub mod provider;
