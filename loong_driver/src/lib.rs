//! # Loong Driver Library
//!
//! Real-time-safe data exchange substrate between a fieldbus cycle thread
//! and non-real-time application threads.
//!
//! # Module Structure
//!
//! - [`swap`] - Wait-free triple buffer
//! - [`view`] - Typed overlay of process data, private or buffer-backed
//! - [`slot`] - Device identity, lifecycle and views
//! - [`parameters`] - Per-device parameter loading and mailbox templates
//! - [`mailbox`] - Mailbox transaction types and state machine
//! - [`channel`] - Lock-free request/response channel and cycle-thread servicer
//! - [`transport`] - Mailbox transport trait
//! - [`loopback`] - In-memory mailbox transport
//! - [`domain`] - Per-domain rx/tx buffer pair and cycle exchange
//! - [`sim`] - Simulated bus driving the whole substrate
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  application threads                     cycle thread                │
//! │  ┌───────────────┐   TypedView   ┌────────────┐  exchange  ┌───────┐ │
//! │  │  DeviceSlot   │──────────────►│ SwapBuffer │◄──────────►│  bus  │ │
//! │  │ (rx/tx views) │               │  (Domain)  │            └───────┘ │
//! │  └───────┬───────┘               └────────────┘                ▲     │
//! │          │ submit / poll_response                              │     │
//! │          ▼                                                     │     │
//! │  ┌────────────────┐  requests/responses  ┌─────────────────┐   │     │
//! │  │ MailboxChannel │◄────────────────────►│ MailboxServicer │───┘     │
//! │  └────────────────┘                      └─────────────────┘         │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

#![deny(warnings)]
#![deny(missing_docs)]

pub mod channel;
pub mod domain;
pub mod loopback;
pub mod mailbox;
pub mod parameters;
pub mod sim;
pub mod slot;
pub mod swap;
pub mod transport;
pub mod view;

// Re-export key types for convenience
pub use crate::channel::{MailboxChannel, MailboxError, MailboxServicer, MailboxStatsSnapshot};
pub use crate::domain::Domain;
pub use crate::loopback::LoopbackTransport;
pub use crate::mailbox::{
    MailboxFailure, MailboxHandle, MailboxOperation, MailboxState, MailboxTransaction,
};
pub use crate::parameters::{
    DeviceParameters, EffectorParameters, MotorMailbox, MotorParameters, ParameterError,
    SensorParameters,
};
pub use crate::sim::{SimBus, SimDevice, SimError};
pub use crate::slot::{
    ConverterSlot, DeviceIdentity, DeviceSlot, DigitSlot, HandSlot, MotorSlot, SensorSlot,
    SlotError, SlotState,
};
pub use crate::swap::{BlockIndices, SwapBuffer, SwapError};
pub use crate::transport::{MailboxTransport, RequestStatus, TransportError};
pub use crate::view::{TypedView, ViewError};
