//! # Memory Interface
//!
//! The capability contract every backing store implements.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;

use crate::error::MemoryResult;

/// Identifies an allocation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackingStore {
    /// The platform heap.
    Heap,
    /// The free-list general-purpose memory.
    GeneralPurpose,
    /// A fixed-size memory pool.
    Pool,
    /// The shared memory stack.
    Stack,
    /// A memory stack owned by one thread.
    ThreadPrivateStack,
}

impl fmt::Display for BackingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Heap => "heap memory",
            Self::GeneralPurpose => "general purpose memory",
            Self::Pool => "memory pool",
            Self::Stack => "memory stack",
            Self::ThreadPrivateStack => "thread private memory stack",
        };
        f.write_str(name)
    }
}

/// A source of raw memory blocks.
///
/// Implementations own their storage and are internally synchronized, so a
/// shared reference is enough to allocate.
pub trait MemoryInterface: Send + Sync + fmt::Debug {
    /// Allocates a block of `layout.size()` bytes aligned to `layout.align()`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot satisfy the request.
    fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<u8>>;

    /// Returns a block to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if a usage rule of the store was violated.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` of this store with the
    /// same `layout`, and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> MemoryResult<()>;

    /// Resizes a block without moving it. Returns `false` if that is not
    /// possible, leaving the block untouched.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live block of this store allocated with `layout`.
    unsafe fn resize_in_place(&self, ptr: NonNull<u8>, layout: Layout, new_size: usize) -> bool {
        let _ = (ptr, layout, new_size);
        false
    }

    /// The strategy behind this store.
    fn backing_store(&self) -> BackingStore;
}
