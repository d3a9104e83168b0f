//! Wait-free triple buffer for cyclic process images.
//!
//! A [`SwapBuffer`] owns three equally sized byte blocks arranged as a ring
//! and a single atomic `current` index. Relative to `current`:
//!
//! ```text
//!        read block            current            write block
//!   ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//!   │ predecessor(cur) │◄─│       cur        │─►│  successor(cur)  │
//!   └──────────────────┘  └──────────────────┘  └──────────────────┘
//! ```
//!
//! - [`publish`](SwapBuffer::publish) copies into the write block, then moves
//!   `current` onto it.
//! - [`read_latest`](SwapBuffer::read_latest) copies the read block out.
//! - [`advance`](SwapBuffer::advance) moves `current` forward without copying,
//!   for callers that wrote the current block in place.
//! - [`commit`](SwapBuffer::commit) is `advance` for in-place writers that
//!   update only part of the block: the new current block starts as a copy
//!   of the one just exposed.
//!
//! The three blocks are pairwise distinct at every instant because they are
//! derived from one index by modular arithmetic.
//!
//! ## Cadence assumption
//!
//! There is no lock. The block a reader copies from becomes the write block
//! of the second publish after the one the reader observed. A reader must
//! therefore finish its copy before the publisher starts that second publish
//! (in practice: within one cycle). The cycle thread's period is what
//! guarantees this; it is a contract on callers, not something the buffer
//! checks.
//!
//! ## Thread Safety
//!
//! - One publisher calls `publish`/`advance`/`commit`: the cycle thread for
//!   device → master data, the application for master → device data.
//! - Any number of readers call `read_latest`.
//! - None of the three operations blocks or allocates.

use loong_common::consts::SWAP_SLOTS;
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Errors raised by swap buffer copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SwapError {
    /// The caller's slice is longer than a block.
    #[error("{len} bytes do not fit in a {block_size}-byte swap block")]
    Overflow {
        /// Requested copy length.
        len: usize,
        /// Size of each block.
        block_size: usize,
    },
}

/// Index of the block following `index` in the ring.
#[inline]
pub const fn successor(index: usize) -> usize {
    (index + 1) % SWAP_SLOTS
}

/// Index of the block preceding `index` in the ring.
#[inline]
pub const fn predecessor(index: usize) -> usize {
    (index + SWAP_SLOTS - 1) % SWAP_SLOTS
}

/// Block roles derived from one load of `current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIndices {
    /// Block `read_latest` copies from.
    pub read: usize,
    /// Block `current` designates.
    pub current: usize,
    /// Block the next `publish` writes into.
    pub write: usize,
}

/// Three-block ring with a wait-free publish/read protocol.
pub struct SwapBuffer {
    blocks: [Box<[UnsafeCell<u8>]>; SWAP_SLOTS],
    block_size: usize,
    current: AtomicUsize,
}

// SAFETY: the blocks are only reached through raw pointers whose use follows
// the single-publisher / cadence contract documented above; `current` is
// atomic.
unsafe impl Sync for SwapBuffer {}

impl SwapBuffer {
    /// Allocate three zeroed blocks of `block_size` bytes.
    pub fn new(block_size: usize) -> Self {
        let blocks = std::array::from_fn(|_| {
            (0..block_size)
                .map(|_| UnsafeCell::new(0u8))
                .collect::<Box<[_]>>()
        });
        Self {
            blocks,
            block_size,
            current: AtomicUsize::new(0),
        }
    }

    /// Size of each block in bytes.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Index of the block `current` designates.
    #[inline]
    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    /// Index of the block `read_latest` copies from.
    #[inline]
    pub fn read_index(&self) -> usize {
        predecessor(self.current_index())
    }

    /// Index of the block the next `publish` writes into.
    #[inline]
    pub fn write_index(&self) -> usize {
        successor(self.current_index())
    }

    /// All three block roles from a single load of `current`.
    #[inline]
    pub fn indices(&self) -> BlockIndices {
        let current = self.current_index();
        BlockIndices {
            read: predecessor(current),
            current,
            write: successor(current),
        }
    }

    #[inline]
    fn block_ptr(&self, index: usize) -> *mut u8 {
        UnsafeCell::raw_get(self.blocks[index].as_ptr())
    }

    /// Start address of block `index`, for alignment checks.
    #[inline]
    pub(crate) fn block_addr(&self, index: usize) -> usize {
        self.block_ptr(index) as usize
    }

    /// Pointer to the first byte of the block `current` designates.
    #[inline]
    pub(crate) fn current_ptr(&self) -> *mut u8 {
        self.block_ptr(self.current_index())
    }

    /// Copy `data` into the write block and make it current.
    ///
    /// Single publisher only. Bytes past `data.len()` in the write block keep
    /// whatever they held two publishes ago.
    pub fn publish(&self, data: &[u8]) -> Result<(), SwapError> {
        self.check_len(data.len())?;
        let next = successor(self.current.load(Ordering::Acquire));
        // SAFETY: `next` is neither the current block nor the read block, and
        // no reader reaches it before the store below publishes it. Length was
        // checked against the block size.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.block_ptr(next), data.len());
        }
        self.current.store(next, Ordering::Release);
        Ok(())
    }

    /// Copy the most recent complete snapshot (current's predecessor) into `out`.
    ///
    /// Copies `out.len()` bytes. Subject to the cadence assumption.
    pub fn read_latest(&self, out: &mut [u8]) -> Result<(), SwapError> {
        self.check_len(out.len())?;
        let latest = predecessor(self.current.load(Ordering::Acquire));
        // SAFETY: the read block is not written until the publisher starts the
        // second publish after the one observed above (cadence assumption).
        unsafe {
            ptr::copy_nonoverlapping(self.block_ptr(latest), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }

    /// Move `current` one block forward without copying.
    ///
    /// Single publisher only.
    pub fn advance(&self) {
        let next = successor(self.current.load(Ordering::Acquire));
        self.current.store(next, Ordering::Release);
    }

    /// Expose the in-place edits of the current block and keep editing a copy.
    ///
    /// Copies the current block into its successor, then makes the successor
    /// current: readers see the staged block, and fields the writer does not
    /// touch before the next commit hold their last value. Single publisher
    /// only.
    pub fn commit(&self) {
        let current = self.current.load(Ordering::Acquire);
        let next = successor(current);
        // SAFETY: `next` is neither the current block nor the read block; the
        // publisher is the only writer of both blocks involved.
        unsafe {
            ptr::copy_nonoverlapping(self.block_ptr(current), self.block_ptr(next), self.block_size);
        }
        self.current.store(next, Ordering::Release);
    }

    #[inline]
    fn check_len(&self, len: usize) -> Result<(), SwapError> {
        if len > self.block_size {
            return Err(SwapError::Overflow {
                len,
                block_size: self.block_size,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for SwapBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapBuffer")
            .field("block_size", &self.block_size)
            .field("current", &self.current_index())
            .finish()
    }
}
