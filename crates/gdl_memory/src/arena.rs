//! # Raw Arena
//!
//! One contiguous, aligned block of memory owned by a backing store.
//!
//! ## Safety Note
//!
//! The arena hands out raw pointers into its block. Bookkeeping words are read
//! and written unaligned, so stores may place headers at any offset.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use crate::error::{MemoryError, MemoryResult};

/// Size of one bookkeeping word.
pub(crate) const WORD: usize = std::mem::size_of::<usize>();

/// A fixed block of memory that is released when the arena is dropped.
///
/// The arena itself never tracks which parts are in use; that is the job of
/// the store that owns it.
#[derive(Debug)]
pub(crate) struct RawArena {
    /// Start of the block.
    base: NonNull<u8>,
    /// Layout the block was allocated with.
    layout: Layout,
}

// SAFETY: the arena is an owned block of bytes; synchronization of its
// contents is the responsibility of the owning store.
unsafe impl Send for RawArena {}
// SAFETY: see above. `&RawArena` only exposes the block address.
unsafe impl Sync for RawArena {}

impl RawArena {
    /// Allocates a block of `capacity` bytes aligned to `align`.
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is zero, `align` is not a power of two,
    /// or the platform heap cannot provide the block.
    pub(crate) fn new(capacity: usize, align: usize) -> MemoryResult<Self> {
        if capacity == 0 {
            return Err(MemoryError::InvalidSize("arena capacity must be greater than zero".into()));
        }
        let layout = Layout::from_size_align(capacity, align.max(WORD))
            .map_err(|_| MemoryError::InvalidAlignment(align))?;

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc(layout) };
        let base = NonNull::new(raw).ok_or_else(|| {
            MemoryError::InvalidSize(format!("platform heap refused an arena of {capacity} bytes"))
        })?;

        Ok(Self { base, layout })
    }

    /// Total size in bytes.
    #[inline]
    pub(crate) const fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// Address of the first byte.
    #[inline]
    pub(crate) fn base_addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Offset of `ptr` from the start of the block, if it lies inside it.
    #[inline]
    pub(crate) fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let addr = ptr.as_ptr() as usize;
        let base = self.base_addr();
        (addr >= base && addr < base + self.capacity()).then(|| addr - base)
    }

    /// Pointer to the byte at `offset`.
    ///
    /// `offset` must be within the block or one past its end.
    #[inline]
    pub(crate) fn ptr_at(&self, offset: usize) -> NonNull<u8> {
        assert!(offset <= self.capacity(), "offset outside of arena");
        // SAFETY: offset is within the allocated block (or one past it), so
        // the result is in bounds and non-null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) }
    }

    /// Reads a bookkeeping word stored at `offset`.
    #[inline]
    pub(crate) fn read_word(&self, offset: usize) -> usize {
        assert!(offset + WORD <= self.capacity(), "word read outside of arena");
        // SAFETY: bounds checked above; unaligned read of plain bytes.
        unsafe { ptr::read_unaligned(self.base.as_ptr().add(offset).cast::<usize>()) }
    }

    /// Writes a bookkeeping word at `offset`.
    #[inline]
    pub(crate) fn write_word(&self, offset: usize, value: usize) {
        assert!(offset + WORD <= self.capacity(), "word write outside of arena");
        // SAFETY: bounds checked above; unaligned write of plain bytes.
        unsafe { ptr::write_unaligned(self.base.as_ptr().add(offset).cast::<usize>(), value) }
    }
}

impl Drop for RawArena {
    fn drop(&mut self) {
        // SAFETY: base was allocated with exactly this layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}

/// Rounds `value` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_alignment_and_capacity() {
        let arena = RawArena::new(1024, 64).unwrap();
        assert_eq!(arena.capacity(), 1024);
        assert_eq!(arena.base_addr() % 64, 0);
    }

    #[test]
    fn test_arena_rejects_zero_capacity() {
        assert!(matches!(RawArena::new(0, 8), Err(MemoryError::InvalidSize(_))));
    }

    #[test]
    fn test_offset_of() {
        let arena = RawArena::new(128, 8).unwrap();
        assert_eq!(arena.offset_of(arena.ptr_at(17)), Some(17));
        let outside = NonNull::new((arena.base_addr() + 128) as *mut u8).unwrap();
        assert_eq!(arena.offset_of(outside), None);
    }

    #[test]
    fn test_words_roundtrip_unaligned() {
        let arena = RawArena::new(64, 8).unwrap();
        arena.write_word(3, 0xDEAD_BEEF);
        assert_eq!(arena.read_word(3), 0xDEAD_BEEF);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(1, 8), 8);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
    }
}
