//! Mailbox transport abstraction.
//!
//! The mailbox servicer does not talk to a fieldbus master directly; it
//! drives a [`MailboxTransport`] with non-blocking calls per transaction:
//! `start` to hand the request to the device's mailbox, `poll` once per
//! cycle until the request finishes, and `cancel` when the servicer gives up
//! on it. Real masters implement the trait over
//! their SDO request objects; [`LoopbackTransport`] implements it in memory.
//!
//! [`LoopbackTransport`]: crate::loopback::LoopbackTransport

use crate::mailbox::MailboxTransaction;
use thiserror::Error;

/// Failures reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The device's mailbox is handling another request; retry later.
    #[error("mailbox busy")]
    Busy,

    /// No mailbox is known for the transaction's handle.
    #[error("no mailbox for handle {0}")]
    UnknownHandle(u32),

    /// The device aborted the transfer with a CoE abort code.
    #[error("transfer aborted (abort code {0:#010x})")]
    Aborted(u32),
}

impl TransportError {
    /// CoE abort code: object does not exist in the object dictionary.
    pub const ABORT_NO_OBJECT: u32 = 0x0602_0000;
    /// CoE abort code: subindex does not exist.
    pub const ABORT_NO_SUBINDEX: u32 = 0x0609_0011;
}

/// Progress of a started request, as seen by one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// The transport has not picked the request up yet.
    Idle,
    /// The transfer is in progress.
    Busy,
    /// The transfer finished; carries the raw object value for reads.
    Done(u32),
    /// The transfer failed.
    Failed(TransportError),
}

/// Non-blocking access to device mailboxes.
///
/// Implementations must not block or allocate in any method; all are called
/// from the cycle thread.
pub trait MailboxTransport {
    /// Hand `request` to its device's mailbox.
    ///
    /// # Errors
    ///
    /// [`TransportError::Busy`] when the mailbox cannot take a request this
    /// cycle; other errors fail the transaction.
    fn start(&mut self, request: &MailboxTransaction) -> Result<(), TransportError>;

    /// Report the progress of a previously started `request`.
    fn poll(&mut self, request: &MailboxTransaction) -> RequestStatus;

    /// Drop the outstanding transfer of a started `request`.
    ///
    /// Called when the transaction times out. Afterwards the device's
    /// mailbox must accept a new `start`.
    fn cancel(&mut self, request: &MailboxTransaction);
}

impl<T: MailboxTransport + ?Sized> MailboxTransport for &mut T {
    fn start(&mut self, request: &MailboxTransaction) -> Result<(), TransportError> {
        (**self).start(request)
    }

    fn poll(&mut self, request: &MailboxTransaction) -> RequestStatus {
        (**self).poll(request)
    }

    fn cancel(&mut self, request: &MailboxTransaction) {
        (**self).cancel(request)
    }
}
