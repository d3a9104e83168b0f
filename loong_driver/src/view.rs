//! Typed overlay of one device's process data.
//!
//! A [`TypedView<T>`] starts out owning a private zeroed `T`, so application
//! code can read and write device data before the bus is wired. Once the
//! device is configured the view is attached to a [`SwapBuffer`] at a fixed
//! byte offset and from then on reads and writes the live image bytes in
//! whichever block is current.
//!
//! ```text
//!   Private(Box<T>) ──bind(offset)──► Private + offset ──attach(buffer)──► Bound
//! ```
//!
//! Both steps happen exactly once. Attaching checks that `offset + size_of::<T>()`
//! fits in a block and that the address is suitably aligned in all three
//! blocks; the process-data layouts in `loong_common::pdo` are packed, so the
//! alignment check never rejects them.

use crate::swap::SwapBuffer;
use bytemuck::Pod;
use loong_common::consts::SWAP_SLOTS;
use std::fmt;
use std::mem::{align_of, size_of};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while binding or attaching a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ViewError {
    /// `bind` was called on a view that already has an offset.
    #[error("view offset already bound to {0}")]
    AlreadyBound(usize),

    /// `bind` or `attach` was called on an attached view.
    #[error("view is already attached to a swap buffer")]
    AlreadyAttached,

    /// `attach` was called before `bind`.
    #[error("view has no offset; bind before attaching")]
    Unbound,

    /// The overlay does not fit in a block.
    #[error("view of {size} bytes at offset {offset} exceeds {block_size}-byte block")]
    OutOfBounds {
        /// Requested byte offset.
        offset: usize,
        /// `size_of::<T>()`.
        size: usize,
        /// Size of each buffer block.
        block_size: usize,
    },

    /// The overlay address does not satisfy `align_of::<T>()`.
    #[error("view at offset {offset} is not {align}-byte aligned")]
    Misaligned {
        /// Requested byte offset.
        offset: usize,
        /// `align_of::<T>()`.
        align: usize,
    },
}

enum Backing<T> {
    Private(Box<T>),
    Bound {
        buffer: Arc<SwapBuffer>,
        offset: usize,
    },
}

/// A `T` stored either privately or inside a swap buffer's current block.
pub struct TypedView<T: Pod> {
    offset: Option<usize>,
    backing: Backing<T>,
}

impl<T: Pod> TypedView<T> {
    /// Create an unbound view over a private zeroed `T`.
    pub fn new() -> Self {
        Self {
            offset: None,
            backing: Backing::Private(Box::new(bytemuck::Zeroable::zeroed())),
        }
    }

    /// Record the byte offset of `T` inside the image.
    pub fn bind(&mut self, offset: usize) -> Result<(), ViewError> {
        if self.is_attached() {
            return Err(ViewError::AlreadyAttached);
        }
        if let Some(bound) = self.offset {
            return Err(ViewError::AlreadyBound(bound));
        }
        self.offset = Some(offset);
        Ok(())
    }

    /// Check that the bound offset fits `buffer` without attaching.
    ///
    /// Returns the offset on success.
    pub fn check_fits(&self, buffer: &SwapBuffer) -> Result<usize, ViewError> {
        if self.is_attached() {
            return Err(ViewError::AlreadyAttached);
        }
        let offset = self.offset.ok_or(ViewError::Unbound)?;
        let size = size_of::<T>();
        let block_size = buffer.block_size();
        match offset.checked_add(size) {
            Some(end) if end <= block_size => {}
            _ => {
                return Err(ViewError::OutOfBounds {
                    offset,
                    size,
                    block_size,
                })
            }
        }
        let align = align_of::<T>();
        if (0..SWAP_SLOTS).any(|i| (buffer.block_addr(i) + offset) % align != 0) {
            return Err(ViewError::Misaligned { offset, align });
        }
        Ok(offset)
    }

    /// Switch the view onto `buffer`.
    ///
    /// The private instance is dropped here; `&mut self` guarantees no
    /// reference into it is still alive.
    pub fn attach(&mut self, buffer: Arc<SwapBuffer>) -> Result<(), ViewError> {
        let offset = self.check_fits(&buffer)?;
        self.backing = Backing::Bound { buffer, offset };
        Ok(())
    }

    /// Bound offset, if any.
    #[inline]
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// Whether the view reads and writes a swap buffer.
    #[inline]
    pub fn is_attached(&self) -> bool {
        matches!(self.backing, Backing::Bound { .. })
    }

    /// Swap buffer the view is attached to.
    pub fn buffer(&self) -> Option<&Arc<SwapBuffer>> {
        match &self.backing {
            Backing::Private(_) => None,
            Backing::Bound { buffer, .. } => Some(buffer),
        }
    }

    /// Copy the current value out.
    #[inline]
    pub fn load(&self) -> T {
        *self.get()
    }

    /// Overwrite the current value.
    #[inline]
    pub fn store(&mut self, value: T) {
        *self.get_mut() = value;
    }

    #[inline]
    fn get(&self) -> &T {
        match &self.backing {
            Backing::Private(value) => &**value,
            // SAFETY: `check_fits` proved `offset + size_of::<T>()` lies inside
            // every block and that the address is aligned for `T`; `T: Pod`
            // makes any byte pattern a valid `T`. Concurrent access follows the
            // swap buffer's cadence contract.
            Backing::Bound { buffer, offset } => unsafe {
                &*(buffer.current_ptr().add(*offset) as *const T)
            },
        }
    }

    #[inline]
    fn get_mut(&mut self) -> &mut T {
        match &mut self.backing {
            Backing::Private(value) => &mut **value,
            // SAFETY: as in `get`; `&mut self` excludes other accesses through
            // this view.
            Backing::Bound { buffer, offset } => unsafe {
                &mut *(buffer.current_ptr().add(*offset) as *mut T)
            },
        }
    }
}

impl<T: Pod> Default for TypedView<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Pod> Deref for TypedView<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.get()
    }
}

impl<T: Pod> DerefMut for TypedView<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.get_mut()
    }
}

impl<T: Pod> fmt::Debug for TypedView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedView")
            .field("offset", &self.offset)
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loong_common::pdo::{DriverRxData, DriverTxData};

    #[test]
    fn private_view_is_zeroed_and_writable() {
        let mut view = TypedView::<DriverRxData>::new();
        assert_eq!({ view.target_position }, 0);

        view.target_position = 1234;
        assert_eq!({ view.target_position }, 1234);
        assert!(!view.is_attached());
    }

    #[test]
    fn bind_is_one_shot() {
        let mut view = TypedView::<DriverRxData>::new();
        view.bind(4).unwrap();
        assert_eq!(view.bind(8), Err(ViewError::AlreadyBound(4)));
        assert_eq!(view.offset(), Some(4));
    }

    #[test]
    fn attach_requires_bind() {
        let mut view = TypedView::<DriverRxData>::new();
        let swap = Arc::new(SwapBuffer::new(64));
        assert_eq!(view.attach(swap), Err(ViewError::Unbound));
    }

    #[test]
    fn attach_rejects_out_of_bounds_offset() {
        let mut view = TypedView::<DriverTxData>::new();
        view.bind(10).unwrap();
        let swap = Arc::new(SwapBuffer::new(20));
        assert_eq!(
            view.attach(swap),
            Err(ViewError::OutOfBounds {
                offset: 10,
                size: 16,
                block_size: 20
            })
        );
        assert!(!view.is_attached());
    }

    #[test]
    fn attach_rejects_misaligned_offset() {
        let mut view = TypedView::<u32>::new();
        view.bind(1).unwrap();
        let swap = Arc::new(SwapBuffer::new(16));
        assert_eq!(
            view.attach(swap),
            Err(ViewError::Misaligned {
                offset: 1,
                align: 4
            })
        );
    }

    #[test]
    fn attached_view_tracks_current_block() {
        let swap = Arc::new(SwapBuffer::new(24));
        let mut view = TypedView::<DriverTxData>::new();
        view.bind(3).unwrap();
        view.attach(Arc::clone(&swap)).unwrap();

        let mut image = [0u8; 24];
        image[3..7].copy_from_slice(&77i32.to_ne_bytes());
        swap.publish(&image).unwrap();
        assert_eq!({ view.actual_position }, 77);

        image[3..7].copy_from_slice(&(-8i32).to_ne_bytes());
        swap.publish(&image).unwrap();
        assert_eq!({ view.actual_position }, -8);
    }

    #[test]
    fn writes_through_view_reach_the_image() {
        let swap = Arc::new(SwapBuffer::new(32));
        let mut view = TypedView::<DriverRxData>::new();
        view.bind(8).unwrap();
        view.attach(Arc::clone(&swap)).unwrap();

        view.target_velocity = 500;
        swap.advance();

        let mut image = [0u8; 32];
        swap.read_latest(&mut image).unwrap();
        let rx: DriverRxData = bytemuck::pod_read_unaligned(&image[8..28]);
        assert_eq!({ rx.target_velocity }, 500);
    }

    #[test]
    fn attach_is_one_shot() {
        let swap = Arc::new(SwapBuffer::new(32));
        let mut view = TypedView::<DriverRxData>::new();
        view.bind(0).unwrap();
        view.attach(Arc::clone(&swap)).unwrap();

        assert_eq!(view.attach(Arc::clone(&swap)), Err(ViewError::AlreadyAttached));
        assert_eq!(view.bind(4), Err(ViewError::AlreadyAttached));
        assert!(Arc::ptr_eq(view.buffer().unwrap(), &swap));
    }
}
