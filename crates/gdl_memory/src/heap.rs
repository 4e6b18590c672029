//! Platform heap, the fallback for every other strategy.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::{MemoryError, MemoryResult};
use crate::interface::{BackingStore, MemoryInterface};

/// Stateless pass-through to the global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapMemory;

impl HeapMemory {
    /// Creates the heap memory handle.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl MemoryInterface for HeapMemory {
    fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<u8>> {
        if layout.size() == 0 {
            return Err(MemoryError::ZeroSizedAllocation(BackingStore::Heap));
        }

        // SAFETY: zero sizes are rejected above.
        let raw = unsafe { alloc::alloc(layout) };
        NonNull::new(raw).ok_or(MemoryError::OutOfMemory {
            resource: BackingStore::Heap,
            requested: layout.size(),
            available: 0,
        })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> MemoryResult<()> {
        alloc::dealloc(ptr.as_ptr(), layout);
        Ok(())
    }

    fn backing_store(&self) -> BackingStore {
        BackingStore::Heap
    }
}
