//! One process-data domain: an rx and a tx swap buffer.
//!
//! The rx buffer carries master → device data. The application writes it
//! in place through attached views and calls [`Domain::commit_rx`] once its
//! targets for the period are staged; the cycle thread only copies the
//! latest committed snapshot into the outgoing frame. The tx buffer carries
//! device → master data; the cycle thread publishes each incoming frame.
//!
//! A commit copies the staged block forward, so a target written once is
//! held until the application writes it again. Between commits the cycle
//! thread keeps sending the same snapshot.

use crate::swap::{SwapBuffer, SwapError};
use std::sync::Arc;

/// Rx/tx swap buffers of one domain.
#[derive(Debug, Clone)]
pub struct Domain {
    id: u32,
    rx: Arc<SwapBuffer>,
    tx: Arc<SwapBuffer>,
}

impl Domain {
    /// Allocate buffers for a domain with the given image sizes.
    pub fn new(id: u32, rx_size: usize, tx_size: usize) -> Self {
        Self {
            id,
            rx: Arc::new(SwapBuffer::new(rx_size)),
            tx: Arc::new(SwapBuffer::new(tx_size)),
        }
    }

    /// Domain number.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Master → device buffer.
    pub fn rx(&self) -> &Arc<SwapBuffer> {
        &self.rx
    }

    /// Device → master buffer.
    pub fn tx(&self) -> &Arc<SwapBuffer> {
        &self.tx
    }

    /// Expose the targets staged through rx views to the cycle thread.
    ///
    /// Application thread only, at most once per cycle period.
    pub fn commit_rx(&self) {
        self.rx.commit();
    }

    /// Per-cycle exchange.
    ///
    /// Copies the latest committed rx snapshot into `outgoing` and publishes
    /// `incoming` into the tx buffer. Cycle thread only.
    pub fn exchange(&self, outgoing: &mut [u8], incoming: &[u8]) -> Result<(), SwapError> {
        self.rx.read_latest(outgoing)?;
        self.tx.publish(incoming)
    }
}
