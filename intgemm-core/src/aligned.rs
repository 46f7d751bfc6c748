//! 64-byte aligned, zero-initialised buffers for kernel operands.
//!
//! Every kernel expects its quantized and prepared operands to start on a
//! register boundary. `AlignedVec` guarantees cache-line alignment, which
//! covers every register width the kernels use.
//!
//! # Example
//!
//! ```
//! use intgemm_core::AlignedVec;
//!
//! let mut b = AlignedVec::<i8>::zeroed(64 * 8);
//! assert_eq!(b.as_ptr() as usize % 64, 0);
//! b.fill(3);
//! assert!(b.iter().all(|&x| x == 3));
//! ```

use std::alloc;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// Alignment of every allocation (one cache line, two AVX2 registers).
pub const ALIGNMENT: usize = 64;

mod sealed {
    pub trait Sealed {}
}

/// Element types an [`AlignedVec`] may hold.
///
/// # Safety
///
/// The all-zero bit pattern must be a valid value of the type.
pub unsafe trait Element: sealed::Sealed + Copy + Default + Send + Sync + 'static {}

macro_rules! element {
    ($($t:ty),*) => {
        $(
            impl sealed::Sealed for $t {}
            unsafe impl Element for $t {}
        )*
    };
}

element!(f32, i8, u8, i16, i32);

/// Heap buffer aligned to [`ALIGNMENT`] bytes.
pub struct AlignedVec<T: Element> {
    ptr: NonNull<T>,
    len: usize,
    layout: alloc::Layout,
}

// SAFETY: AlignedVec uniquely owns its allocation, like Vec<T>.
unsafe impl<T: Element> Send for AlignedVec<T> {}
unsafe impl<T: Element> Sync for AlignedVec<T> {}

impl<T: Element> AlignedVec<T> {
    /// Allocate `len` zeroed elements.
    pub fn zeroed(len: usize) -> Self {
        let bytes = len
            .checked_mul(std::mem::size_of::<T>())
            .unwrap_or_else(|| panic!("AlignedVec of {len} elements overflows usize"));
        let layout = match alloc::Layout::from_size_align(bytes, ALIGNMENT) {
            Ok(layout) => layout,
            Err(err) => panic!("invalid layout for {bytes} bytes: {err}"),
        };

        let ptr = if bytes == 0 {
            NonNull::dangling()
        } else {
            // SAFETY: layout has non-zero size.
            let raw = unsafe { alloc::alloc_zeroed(layout) };
            match NonNull::new(raw as *mut T) {
                Some(ptr) => ptr,
                None => alloc::handle_alloc_error(layout),
            }
        };

        Self { ptr, len, layout }
    }

    /// Aligned copy of `data`.
    pub fn from_slice(data: &[T]) -> Self {
        let mut out = Self::zeroed(data.len());
        out.copy_from_slice(data);
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[T] {
        self
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }
}

impl<T: Element> Deref for AlignedVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: ptr is valid for len initialised elements (or dangling with len 0).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Element> DerefMut for AlignedVec<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as in deref, and &mut self guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Element> Drop for AlignedVec<T> {
    fn drop(&mut self) {
        if self.layout.size() > 0 {
            unsafe { alloc::dealloc(self.ptr.as_ptr() as *mut u8, self.layout) };
        }
    }
}

impl<T: Element> Clone for AlignedVec<T> {
    fn clone(&self) -> Self {
        Self::from_slice(self)
    }
}

impl<T: Element + fmt::Debug> fmt::Debug for AlignedVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Element + PartialEq> PartialEq for AlignedVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Element> FromIterator<T> for AlignedVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: Vec<T> = iter.into_iter().collect();
        Self::from_slice(&items)
    }
}
