//! # Heap Allocation Counter
//!
//! Counts calls into the platform heap, to verify that the custom strategies
//! keep allocations away from it.
//!
//! The counts only move when [`CountingAllocator`] is the global allocator of
//! the binary:
//!
//! ```rust,ignore
//! #[global_allocator]
//! static ALLOCATOR: CountingAllocator = CountingAllocator;
//!
//! let counter = HeapAllocationCounter::new();
//! let values: GeneralPurposeVec<u32> = general_purpose_vec();
//! assert!(counter.check_num_calls_expected(0, 0));
//! ```

#![allow(unsafe_code)]

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

static ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);
static DEALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

/// Global allocator that forwards to [`System`] and counts every call.
///
/// Reallocations are counted as one allocation plus one deallocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingAllocator;

// SAFETY: every call is forwarded unchanged to the system allocator.
unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        DEALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        System.dealloc(ptr, layout);
    }
}

/// Heap calls made since the counter was created or last reset.
#[derive(Debug, Clone, Copy)]
pub struct HeapAllocationCounter {
    allocations_at_start: usize,
    deallocations_at_start: usize,
}

impl Default for HeapAllocationCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapAllocationCounter {
    /// Starts counting from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocations_at_start: ALLOCATIONS.load(Ordering::SeqCst),
            deallocations_at_start: DEALLOCATIONS.load(Ordering::SeqCst),
        }
    }

    /// Restarts counting from now.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Heap allocations since the start.
    #[must_use]
    pub fn num_allocations(&self) -> usize {
        ALLOCATIONS.load(Ordering::SeqCst) - self.allocations_at_start
    }

    /// Heap deallocations since the start.
    #[must_use]
    pub fn num_deallocations(&self) -> usize {
        DEALLOCATIONS.load(Ordering::SeqCst) - self.deallocations_at_start
    }

    /// Whether exactly the expected numbers of calls happened. Mismatches are
    /// logged.
    #[must_use]
    pub fn check_num_calls_expected(&self, allocations: usize, deallocations: usize) -> bool {
        let (actual_allocations, actual_deallocations) = (self.num_allocations(), self.num_deallocations());
        let matches = actual_allocations == allocations && actual_deallocations == deallocations;
        if !matches {
            tracing::warn!(
                expected_allocations = allocations,
                actual_allocations,
                expected_deallocations = deallocations,
                actual_deallocations,
                "unexpected number of heap calls"
            );
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_forwarded_calls() {
        let counter = HeapAllocationCounter::new();
        let layout = Layout::from_size_align(64, 8).unwrap();
        unsafe {
            let ptr = CountingAllocator.alloc(layout);
            assert!(!ptr.is_null());
            CountingAllocator.dealloc(ptr, layout);
        }
        // Not the global allocator here, so only the calls above count
        assert!(counter.check_num_calls_expected(1, 1));
    }
}
