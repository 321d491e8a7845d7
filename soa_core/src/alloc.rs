//! Aligned, zero-filled buffer allocation.
//!
//! Every container owns exactly one `AlignedBuf`. The buffer only manages
//! raw bytes; constructing and dropping the elements stored inside it is
//! the owner's job.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::constants::ALIGNMENT;
use crate::error::{Result, SoaError};

#[repr(C, align(16))]
struct AlignUnit([u8; ALIGNMENT]);

/// An owned block of `ALIGNMENT`-aligned memory.
///
/// The bytes are zeroed at allocation time, so the whole block is always
/// initialized memory even where no element has been written yet.
pub struct AlignedBuf {
    ptr: NonNull<u8>,
    len: usize,
}

impl AlignedBuf {
    /// A buffer that owns no memory. Its pointer is dangling but aligned.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            ptr: NonNull::<AlignUnit>::dangling().cast(),
            len: 0,
        }
    }

    /// Allocates `len` zeroed bytes.
    ///
    /// # Errors
    ///
    /// Returns `SoaError::AllocFailed` if the allocator returns null and
    /// `SoaError::CapacityOverflow` if `len` cannot be described by a layout.
    pub fn zeroed(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self::empty());
        }
        let layout = Layout::from_size_align(len, ALIGNMENT).map_err(|_| {
            SoaError::CapacityOverflow {
                requested: len,
                row_bytes: 1,
            }
        })?;
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        match NonNull::new(raw) {
            Some(ptr) => Ok(Self { ptr, len }),
            None => Err(SoaError::AllocFailed { layout }),
        }
    }

    /// Number of bytes owned.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if no memory is owned.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address of the block.
    #[inline]
    pub const fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// The whole block as bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8] {
        // SAFETY: the block is `len` initialized bytes (zeroed at allocation).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The whole block as mutable bytes.
    #[inline]
    pub const fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: see `as_bytes`; `&mut self` gives exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Default for AlignedBuf {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        if self.len != 0 {
            // SAFETY: a non-empty buffer was allocated with exactly this layout.
            unsafe {
                let layout = Layout::from_size_align_unchecked(self.len, ALIGNMENT);
                alloc::dealloc(self.ptr.as_ptr(), layout);
            }
        }
    }
}

impl std::fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuf")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

// SAFETY: AlignedBuf is a uniquely owned byte block.
unsafe impl Send for AlignedBuf {}
// SAFETY: shared access only hands out shared byte slices.
unsafe impl Sync for AlignedBuf {}
