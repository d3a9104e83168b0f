//! Mailbox (acyclic) transactions.
//!
//! A [`MailboxTransaction`] is one read or write of a single object in a
//! device's parameter space. Transactions are plain `Copy` values: the
//! application fills one in, submits it to a [`MailboxChannel`], and later
//! receives the finished copy back.
//!
//! # State Machine
//!
//! ```text
//!   Pending ──start──► AwaitingSend ──poll──► AwaitingAck ──poll──► Completed
//!      │                    │                      │
//!      └────────────────────┴──────────────────────┴──── failure/timeout ──► Error
//! ```
//!
//! [`MailboxChannel`]: crate::channel::MailboxChannel

use crate::transport::TransportError;
use loong_common::descriptor::{BitLength, TransportDescriptor};
use std::fmt;

/// Opaque per-device transport handle.
///
/// Assigned by whoever enumerates the bus; the transport uses it to find the
/// device's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MailboxHandle(pub u32);

impl fmt::Display for MailboxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mbx#{}", self.0)
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum MailboxState {
    /// Failed (transport error or timeout). Terminal.
    Error = -1,
    /// Queued, not yet accepted by the transport.
    Pending = 0,
    /// Accepted by the transport, not yet on the wire.
    AwaitingSend = 1,
    /// Sent, waiting for the device's answer.
    AwaitingAck = 2,
    /// Answered by the device. Terminal.
    Completed = 3,
}

impl MailboxState {
    /// Numeric state code.
    #[inline]
    pub const fn code(self) -> i8 {
        self as i8
    }

    /// Whether no further transitions happen.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Direction of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MailboxOperation {
    /// Download `value` to the device.
    Write,
    /// Upload the object value into `value`.
    Read,
}

/// Reason a transaction ended in [`MailboxState::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxFailure {
    /// No answer within the channel's timeout.
    Timeout,
    /// The transport refused or aborted the transfer.
    Transport(TransportError),
}

impl fmt::Display for MailboxFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out"),
            Self::Transport(e) => write!(f, "{e}"),
        }
    }
}

/// One mailbox read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxTransaction {
    /// Transport handle of the target device.
    pub handle: MailboxHandle,
    /// Value to write, or value read once completed.
    pub value: i64,
    /// Alias of the target device.
    pub alias: u16,
    /// Lifecycle state.
    pub state: MailboxState,
    /// Object index.
    pub index: u16,
    /// Object subindex.
    pub subindex: u8,
    /// Object width.
    pub bit_length: BitLength,
    /// Whether the object is signed.
    pub signed: bool,
    /// Read or write.
    pub operation: MailboxOperation,
    /// Set once the channel has taken the transaction's pool slot back.
    pub recycled: bool,
    /// Why the transaction failed, when `state` is `Error`.
    pub failure: Option<MailboxFailure>,
}

impl MailboxTransaction {
    /// Generic write template for the device behind `handle`.
    ///
    /// Addressing is zeroed (index 0, subindex 0, 8-bit, unsigned); fill it in
    /// with [`with_descriptor`](Self::with_descriptor) before submitting.
    pub const fn template(handle: MailboxHandle, alias: u16) -> Self {
        Self {
            handle,
            value: 0,
            alias,
            state: MailboxState::Pending,
            index: 0,
            subindex: 0,
            bit_length: BitLength::Bits8,
            signed: false,
            operation: MailboxOperation::Write,
            recycled: false,
            failure: None,
        }
    }

    /// Copy of `self` addressing `descriptor` with the given operation and value.
    pub const fn with_descriptor(
        mut self,
        descriptor: TransportDescriptor,
        operation: MailboxOperation,
        value: i64,
    ) -> Self {
        self.index = descriptor.index;
        self.subindex = descriptor.subindex;
        self.bit_length = descriptor.bit_length;
        self.signed = descriptor.signed;
        self.operation = operation;
        self.value = value;
        self.state = MailboxState::Pending;
        self.recycled = false;
        self.failure = None;
        self
    }

    /// Addressing of the target object.
    pub const fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor {
            index: self.index,
            subindex: self.subindex,
            bit_length: self.bit_length,
            signed: self.signed,
        }
    }

    /// `value` truncated to the object width, as sent on the wire.
    #[inline]
    pub const fn raw_value(&self) -> u32 {
        self.bit_length.encode(self.value)
    }

    /// Mark completed; reads take their value from `raw`.
    pub(crate) fn complete(&mut self, raw: u32) {
        if self.operation == MailboxOperation::Read {
            self.value = self.bit_length.decode(raw, self.signed);
        }
        self.state = MailboxState::Completed;
    }

    /// Mark failed.
    pub(crate) fn fail(&mut self, failure: MailboxFailure) {
        self.failure = Some(failure);
        self.state = MailboxState::Error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPERATURE: TransportDescriptor = TransportDescriptor {
        index: 0x2026,
        subindex: 1,
        bit_length: BitLength::Bits16,
        signed: true,
    };

    #[test]
    fn state_codes() {
        assert_eq!(MailboxState::Error.code(), -1);
        assert_eq!(MailboxState::Pending.code(), 0);
        assert_eq!(MailboxState::AwaitingSend.code(), 1);
        assert_eq!(MailboxState::AwaitingAck.code(), 2);
        assert_eq!(MailboxState::Completed.code(), 3);
        assert!(MailboxState::Error.is_terminal());
        assert!(!MailboxState::AwaitingAck.is_terminal());
    }

    #[test]
    fn template_is_zeroed_write() {
        let txn = MailboxTransaction::template(MailboxHandle(4), 12);
        assert_eq!(txn.handle, MailboxHandle(4));
        assert_eq!(txn.alias, 12);
        assert_eq!(txn.index, 0);
        assert_eq!(txn.subindex, 0);
        assert_eq!(txn.operation, MailboxOperation::Write);
        assert_eq!(txn.state, MailboxState::Pending);
        assert!(!txn.recycled);
    }

    #[test]
    fn with_descriptor_resets_outcome() {
        let mut txn = MailboxTransaction::template(MailboxHandle(0), 1);
        txn.fail(MailboxFailure::Timeout);
        txn.recycled = true;

        let txn = txn.with_descriptor(TEMPERATURE, MailboxOperation::Read, 0);
        assert_eq!(txn.descriptor(), TEMPERATURE);
        assert_eq!(txn.state, MailboxState::Pending);
        assert_eq!(txn.failure, None);
        assert!(!txn.recycled);
    }

    #[test]
    fn complete_decodes_reads_only() {
        let read = MailboxTransaction::template(MailboxHandle(0), 1).with_descriptor(
            TEMPERATURE,
            MailboxOperation::Read,
            0,
        );
        let mut done = read;
        done.complete(0xFFF6);
        assert_eq!(done.value, -10);
        assert_eq!(done.state, MailboxState::Completed);

        let mut write = read;
        write.operation = MailboxOperation::Write;
        write.value = 1;
        write.complete(0xFFFF);
        assert_eq!(write.value, 1);
    }

    #[test]
    fn raw_value_truncates_to_width() {
        let txn = MailboxTransaction::template(MailboxHandle(0), 1).with_descriptor(
            TEMPERATURE,
            MailboxOperation::Write,
            -2,
        );
        assert_eq!(txn.raw_value(), 0xFFFE);
    }
}
