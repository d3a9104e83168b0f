//! Lock-free request/response channel for mailbox transactions.
//!
//! # Architecture
//!
//! ```text
//!  application threads                         cycle thread
//!  ───────────────────                         ────────────
//!   submit(txn) ──► free ─► slot ─► requests ──► MailboxServicer::service()
//!                                                   │ start / poll transport
//!   poll_response() ◄── free ◄── slot ◄── responses ◄┘
//! ```
//!
//! All transaction storage is a pool of `pool_size` slots allocated when the
//! channel is built. Three bounded lock-free queues carry slot indices:
//! `free` (slots nobody owns), `requests` (submitted, not yet picked up) and
//! `responses` (finished, not yet consumed). A slot index lives in exactly one
//! queue or in the servicer's in-flight list at any time, and whoever holds
//! the index owns the slot.
//!
//! The servicer side ([`MailboxServicer`]) runs on the cycle thread. It never
//! blocks, allocates or logs; progress is reported through [`MailboxStats`].

use crate::mailbox::{MailboxFailure, MailboxState, MailboxTransaction};
use crate::transport::{MailboxTransport, RequestStatus, TransportError};
use crossbeam::queue::ArrayQueue;
use loong_common::config::ConfigError;
use loong_common::consts::MAX_MAILBOX_IN_FLIGHT;
use loong_common::driver_config::MailboxConfig;
use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by the channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailboxError {
    /// Every pool slot is in use.
    #[error("mailbox pool exhausted")]
    PoolExhausted,

    /// The servicer was already handed out.
    #[error("mailbox channel already has a servicer")]
    ServicerTaken,

    /// Channel limits failed validation.
    #[error("invalid mailbox configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Counters updated by the servicer.
#[derive(Debug, Default)]
pub struct MailboxStats {
    submitted: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

/// Point-in-time copy of [`MailboxStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStatsSnapshot {
    /// Transactions accepted by `submit`.
    pub submitted: u64,
    /// Transactions accepted by the transport.
    pub started: u64,
    /// Transactions that reached `Completed`.
    pub completed: u64,
    /// Transactions that reached `Error`, timeouts included.
    pub failed: u64,
    /// Transactions that failed by timeout.
    pub timed_out: u64,
}

impl MailboxStats {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    pub fn snapshot(&self) -> MailboxStatsSnapshot {
        MailboxStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Fixed pool of transactions with request and response queues.
pub struct MailboxChannel {
    slots: Box<[UnsafeCell<MailboxTransaction>]>,
    free: ArrayQueue<u16>,
    requests: ArrayQueue<u16>,
    responses: ArrayQueue<u16>,
    config: MailboxConfig,
    servicer_taken: AtomicBool,
    stats: MailboxStats,
}

// SAFETY: a slot is only accessed by the holder of its index, and indices
// are handed between threads through the queues, which synchronise.
unsafe impl Sync for MailboxChannel {}

impl MailboxChannel {
    /// Allocate the pool and queues.
    ///
    /// # Errors
    ///
    /// [`MailboxError::Config`] if `config` fails validation.
    pub fn new(config: MailboxConfig) -> Result<Arc<Self>, MailboxError> {
        config.validate()?;
        let pool_size = config.pool_size;
        let placeholder = MailboxTransaction::template(Default::default(), 0);

        let slots = (0..pool_size)
            .map(|_| UnsafeCell::new(MailboxTransaction {
                recycled: true,
                ..placeholder
            }))
            .collect::<Box<[_]>>();
        let free = ArrayQueue::new(pool_size);
        for index in 0..pool_size {
            // validate() bounds pool_size by MAX_MAILBOX_POOL_SIZE, which fits u16.
            let _ = free.push(index as u16);
        }

        info!(
            pool_size,
            max_starts_per_cycle = config.max_starts_per_cycle,
            timeout_cycles = config.timeout_cycles,
            "Mailbox channel created"
        );

        Ok(Arc::new(Self {
            slots,
            free,
            requests: ArrayQueue::new(pool_size),
            responses: ArrayQueue::new(pool_size),
            config,
            servicer_taken: AtomicBool::new(false),
            stats: MailboxStats::default(),
        }))
    }

    /// Channel limits.
    pub fn config(&self) -> &MailboxConfig {
        &self.config
    }

    /// Counters.
    pub fn stats(&self) -> MailboxStatsSnapshot {
        self.stats.snapshot()
    }

    /// Unused pool slots.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Submitted transactions not yet picked up by the servicer.
    pub fn queued_requests(&self) -> usize {
        self.requests.len()
    }

    /// Finished transactions not yet consumed.
    pub fn queued_responses(&self) -> usize {
        self.responses.len()
    }

    /// Queue `request` for the cycle thread.
    ///
    /// The stored copy starts in [`MailboxState::Pending`] with no failure
    /// and `recycled` cleared, whatever `request` held.
    ///
    /// # Errors
    ///
    /// [`MailboxError::PoolExhausted`] when every slot is in use; `request`
    /// is dropped.
    pub fn submit(&self, request: MailboxTransaction) -> Result<(), MailboxError> {
        let index = self.free.pop().ok_or(MailboxError::PoolExhausted)?;
        // SAFETY: popping `index` from `free` made this thread its sole owner.
        unsafe {
            *self.slot(index) = MailboxTransaction {
                state: MailboxState::Pending,
                recycled: false,
                failure: None,
                ..request
            };
        }
        MailboxStats::bump(&self.stats.submitted);
        // `requests` holds at most pool_size indices, so this cannot fail.
        let _ = self.requests.push(index);
        Ok(())
    }

    /// Take the oldest finished transaction, if any.
    ///
    /// Returns a copy in [`MailboxState::Completed`] or [`MailboxState::Error`]
    /// with `recycled` set: its slot is back in the pool.
    pub fn poll_response(&self) -> Option<MailboxTransaction> {
        let index = self.responses.pop()?;
        // SAFETY: popping `index` from `responses` made this thread its sole owner.
        let response = unsafe {
            let slot = &mut *self.slot(index);
            slot.recycled = true;
            *slot
        };
        let _ = self.free.push(index);
        Some(response)
    }

    /// Hand out the cycle-thread side of the channel.
    ///
    /// # Errors
    ///
    /// [`MailboxError::ServicerTaken`] on every call after the first.
    pub fn servicer(self: &Arc<Self>) -> Result<MailboxServicer, MailboxError> {
        if self.servicer_taken.swap(true, Ordering::AcqRel) {
            return Err(MailboxError::ServicerTaken);
        }
        debug!("Mailbox servicer handed out");
        Ok(MailboxServicer {
            channel: Arc::clone(self),
            in_flight: heapless::Vec::new(),
        })
    }

    #[inline]
    fn slot(&self, index: u16) -> *mut MailboxTransaction {
        self.slots[index as usize].get()
    }
}

impl std::fmt::Debug for MailboxChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxChannel")
            .field("config", &self.config)
            .field("available", &self.available())
            .field("stats", &self.stats())
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    slot: u16,
    age: u32,
}

/// What one `service` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceReport {
    /// Requests taken off the request queue this cycle.
    pub started: usize,
    /// Transactions pushed to the response queue this cycle.
    pub finished: usize,
    /// Transactions still in flight afterwards.
    pub in_flight: usize,
}

/// Cycle-thread side of a [`MailboxChannel`].
///
/// At most one exists per channel.
#[derive(Debug)]
pub struct MailboxServicer {
    channel: Arc<MailboxChannel>,
    in_flight: heapless::Vec<InFlight, MAX_MAILBOX_IN_FLIGHT>,
}

impl MailboxServicer {
    /// Channel this servicer drives.
    pub fn channel(&self) -> &Arc<MailboxChannel> {
        &self.channel
    }

    /// Transactions currently in flight.
    pub fn in_flight(&self) -> impl Iterator<Item = &MailboxTransaction> + '_ {
        // SAFETY: in-flight slots are owned by the servicer; `&self` excludes
        // `service` while the iterator lives.
        self.in_flight
            .iter()
            .map(|entry| unsafe { &*self.channel.slot(entry.slot) })
    }

    /// Advance the channel by one cycle.
    ///
    /// 1. Every in-flight transaction ages by one cycle and is stepped
    ///    against `transport`; transactions that finish, or exceed
    ///    `timeout_cycles`, move to the response queue. A timed-out
    ///    transaction that reached the transport is cancelled there first,
    ///    so the device's mailbox takes the next request.
    /// 2. Up to `max_starts_per_cycle` queued requests are taken off the
    ///    request queue and started, while in-flight capacity remains.
    pub fn service<T: MailboxTransport + ?Sized>(&mut self, transport: &mut T) -> ServiceReport {
        let channel = &*self.channel;
        let timeout = channel.config.timeout_cycles;
        let mut report = ServiceReport::default();

        let mut i = 0;
        while i < self.in_flight.len() {
            let entry = &mut self.in_flight[i];
            entry.age = entry.age.saturating_add(1);
            // SAFETY: in-flight slots are owned by the servicer.
            let txn = unsafe { &mut *channel.slot(entry.slot) };
            step(txn, transport, &channel.stats);
            if !txn.state.is_terminal() && entry.age >= timeout {
                if txn.state != MailboxState::Pending {
                    transport.cancel(txn);
                }
                txn.fail(MailboxFailure::Timeout);
                MailboxStats::bump(&channel.stats.timed_out);
            }
            if txn.state.is_terminal() {
                let slot = entry.slot;
                self.in_flight.swap_remove(i);
                finish(channel, slot, txn.state);
                report.finished += 1;
            } else {
                i += 1;
            }
        }

        while report.started < channel.config.max_starts_per_cycle && !self.in_flight.is_full() {
            let Some(slot) = channel.requests.pop() else {
                break;
            };
            report.started += 1;
            // SAFETY: popping `slot` from `requests` made the servicer its owner.
            let txn = unsafe { &mut *channel.slot(slot) };
            step(txn, transport, &channel.stats);
            if txn.state.is_terminal() {
                finish(channel, slot, txn.state);
                report.finished += 1;
            } else {
                // Capacity was checked by the loop condition.
                let _ = self.in_flight.push(InFlight { slot, age: 0 });
            }
        }

        report.in_flight = self.in_flight.len();
        report
    }
}

/// Move `txn` at most one state forward.
#[inline]
fn step<T: MailboxTransport + ?Sized>(
    txn: &mut MailboxTransaction,
    transport: &mut T,
    stats: &MailboxStats,
) {
    match txn.state {
        MailboxState::Pending => match transport.start(txn) {
            Ok(()) => {
                txn.state = MailboxState::AwaitingSend;
                MailboxStats::bump(&stats.started);
            }
            Err(TransportError::Busy) => {}
            Err(e) => txn.fail(MailboxFailure::Transport(e)),
        },
        MailboxState::AwaitingSend => match transport.poll(txn) {
            RequestStatus::Failed(e) => txn.fail(MailboxFailure::Transport(e)),
            _ => txn.state = MailboxState::AwaitingAck,
        },
        MailboxState::AwaitingAck => match transport.poll(txn) {
            RequestStatus::Done(raw) => txn.complete(raw),
            RequestStatus::Failed(e) => txn.fail(MailboxFailure::Transport(e)),
            RequestStatus::Idle | RequestStatus::Busy => {}
        },
        MailboxState::Completed | MailboxState::Error => {}
    }
}

#[inline]
fn finish(channel: &MailboxChannel, slot: u16, state: MailboxState) {
    match state {
        MailboxState::Completed => MailboxStats::bump(&channel.stats.completed),
        _ => MailboxStats::bump(&channel.stats.failed),
    }
    // `responses` holds at most pool_size indices, so this cannot fail.
    let _ = channel.responses.push(slot);
}
