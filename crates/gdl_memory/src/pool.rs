//! # Memory Pool
//!
//! Fixed-size block store for objects that are frequently allocated and freed.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::ptr::NonNull;

use parking_lot::Mutex;

use crate::arena::{align_up, RawArena};
use crate::dev_check::dev_check;
use crate::error::{MemoryError, MemoryResult};
use crate::interface::{BackingStore, MemoryInterface};

/// A pool of equally sized memory blocks.
///
/// All blocks live in one pre-allocated arena. Allocation and deallocation
/// are O(1) pops and pushes on a free list of block indices.
///
/// # Thread Safety
///
/// The free list is guarded by a mutex; the pool can be shared freely.
///
/// # Example
///
/// ```rust,ignore
/// let pool = MemoryPool::new(32, 1000, 32)?;
/// let layout = Layout::from_size_align(32, 32)?;
///
/// let block = pool.allocate(layout)?;
/// unsafe { pool.deallocate(block, layout)? };
/// ```
#[derive(Debug)]
pub struct MemoryPool {
    /// Storage for all blocks.
    arena: RawArena,
    /// Size served by every block.
    element_size: usize,
    /// Alignment of every block.
    alignment: usize,
    /// Distance between two blocks.
    stride: usize,
    /// Number of blocks.
    num_elements: usize,
    /// Free list and usage flags.
    state: Mutex<PoolState>,
}

#[derive(Debug)]
struct PoolState {
    /// Indices of available blocks.
    free_list: Vec<usize>,
    /// Usage flag per block.
    in_use: Vec<bool>,
    /// Number of allocated blocks.
    allocated_count: usize,
}

impl MemoryPool {
    /// Creates a pool of `num_elements` blocks of `element_size` bytes.
    ///
    /// All memory is pre-allocated upfront.
    ///
    /// # Arguments
    ///
    /// * `element_size` - Size of one block in bytes
    /// * `num_elements` - Number of blocks
    /// * `alignment` - Alignment of every block (power of two)
    ///
    /// # Errors
    ///
    /// Returns an error for zero sizes, an invalid alignment, or if the arena
    /// cannot be allocated.
    pub fn new(element_size: usize, num_elements: usize, alignment: usize) -> MemoryResult<Self> {
        if element_size == 0 || num_elements == 0 {
            return Err(MemoryError::InvalidSize(format!(
                "memory pool needs a positive element size and count, got {element_size} x {num_elements}"
            )));
        }
        if !alignment.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment(alignment));
        }

        let stride = align_up(element_size, alignment);
        let capacity = stride.checked_mul(num_elements).ok_or_else(|| {
            MemoryError::InvalidSize(format!("memory pool of {num_elements} x {stride} bytes overflows"))
        })?;
        let arena = RawArena::new(capacity, alignment)?;

        Ok(Self {
            arena,
            element_size,
            alignment,
            stride,
            num_elements,
            state: Mutex::new(PoolState {
                free_list: (0..num_elements).rev().collect(),
                in_use: vec![false; num_elements],
                allocated_count: 0,
            }),
        })
    }

    /// Size of one block in bytes.
    #[inline]
    #[must_use]
    pub const fn element_size(&self) -> usize {
        self.element_size
    }

    /// Alignment of every block.
    #[inline]
    #[must_use]
    pub const fn alignment(&self) -> usize {
        self.alignment
    }

    /// Total number of blocks.
    #[inline]
    #[must_use]
    pub const fn num_elements(&self) -> usize {
        self.num_elements
    }

    /// Number of blocks currently handed out.
    #[must_use]
    pub fn num_allocations(&self) -> usize {
        self.state.lock().allocated_count
    }

    /// Number of blocks still available.
    #[must_use]
    pub fn num_free_elements(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Verifies the free list against the usage flags.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Corrupted`] describing the first inconsistency.
    pub fn check_consistency(&self) -> MemoryResult<()> {
        let state = self.state.lock();
        let corrupted = |details: String| MemoryError::Corrupted { resource: BackingStore::Pool, details };

        if state.free_list.len() + state.allocated_count != self.num_elements {
            return Err(corrupted(format!(
                "{} free + {} allocated blocks != {} blocks",
                state.free_list.len(),
                state.allocated_count,
                self.num_elements
            )));
        }

        let mut seen = vec![false; self.num_elements];
        for &index in &state.free_list {
            if index >= self.num_elements {
                return Err(corrupted(format!("free list holds out-of-range index {index}")));
            }
            if seen[index] {
                return Err(corrupted(format!("block {index} is listed twice")));
            }
            if state.in_use[index] {
                return Err(corrupted(format!("block {index} is free and in use")));
            }
            seen[index] = true;
        }
        Ok(())
    }
}

impl MemoryInterface for MemoryPool {
    fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<u8>> {
        if layout.size() != self.element_size {
            return Err(MemoryError::SizeMismatch { expected: self.element_size, requested: layout.size() });
        }
        if layout.align() > self.alignment {
            return Err(MemoryError::AlignmentMismatch { provided: self.alignment, requested: layout.align() });
        }

        let mut state = self.state.lock();
        let index = state.free_list.pop().ok_or(MemoryError::OutOfMemory {
            resource: BackingStore::Pool,
            requested: layout.size(),
            available: 0,
        })?;
        state.in_use[index] = true;
        state.allocated_count += 1;

        Ok(self.arena.ptr_at(index * self.stride))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) -> MemoryResult<()> {
        let offset = self.arena.offset_of(ptr).ok_or(MemoryError::ForeignPointer(BackingStore::Pool))?;
        dev_check!(offset % self.stride != 0, MemoryError::ForeignPointer(BackingStore::Pool));

        let index = offset / self.stride;
        let mut state = self.state.lock();
        dev_check!(!state.in_use[index], MemoryError::DoubleFree);

        state.in_use[index] = false;
        state.free_list.push(index);
        state.allocated_count -= 1;
        Ok(())
    }

    fn backing_store(&self) -> BackingStore {
        BackingStore::Pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(size: usize, align: usize) -> Layout {
        Layout::from_size_align(size, align).unwrap()
    }

    #[test]
    fn test_pool_allocate_free() {
        let pool = MemoryPool::new(32, 10, 32).unwrap();

        let block = pool.allocate(layout(32, 32)).unwrap();
        assert_eq!(block.as_ptr() as usize % 32, 0);
        assert_eq!(pool.num_allocations(), 1);
        assert_eq!(pool.num_free_elements(), 9);

        unsafe { pool.deallocate(block, layout(32, 32)).unwrap() };
        assert_eq!(pool.num_allocations(), 0);
        pool.check_consistency().unwrap();
    }

    #[test]
    fn test_pool_full() {
        let pool = MemoryPool::new(8, 2, 8).unwrap();

        let _a = pool.allocate(layout(8, 8)).unwrap();
        let _b = pool.allocate(layout(8, 8)).unwrap();
        assert!(matches!(
            pool.allocate(layout(8, 8)),
            Err(MemoryError::OutOfMemory { resource: BackingStore::Pool, .. })
        ));
    }

    #[test]
    fn test_pool_reuse() {
        let pool = MemoryPool::new(16, 1, 16).unwrap();

        let first = pool.allocate(layout(16, 8)).unwrap();
        unsafe { pool.deallocate(first, layout(16, 8)).unwrap() };

        let second = pool.allocate(layout(16, 8)).unwrap();
        assert_eq!(first, second); // Same block reused
    }

    #[test]
    fn test_pool_rejects_mismatched_requests() {
        let pool = MemoryPool::new(32, 4, 8).unwrap();

        assert_eq!(
            pool.allocate(layout(16, 8)),
            Err(MemoryError::SizeMismatch { expected: 32, requested: 16 })
        );
        assert_eq!(
            pool.allocate(layout(32, 16)),
            Err(MemoryError::AlignmentMismatch { provided: 8, requested: 16 })
        );
    }

    #[test]
    fn test_pool_stride_respects_alignment() {
        let pool = MemoryPool::new(24, 3, 16).unwrap();
        let a = pool.allocate(layout(24, 16)).unwrap();
        let b = pool.allocate(layout(24, 16)).unwrap();
        assert_eq!(a.as_ptr() as usize % 16, 0);
        assert_eq!(b.as_ptr() as usize % 16, 0);
        assert_eq!((a.as_ptr() as usize).abs_diff(b.as_ptr() as usize), 32);
    }

    #[test]
    fn test_pool_invalid_construction() {
        assert!(matches!(MemoryPool::new(0, 10, 8), Err(MemoryError::InvalidSize(_))));
        assert!(matches!(MemoryPool::new(8, 0, 8), Err(MemoryError::InvalidSize(_))));
        assert_eq!(MemoryPool::new(8, 10, 12).unwrap_err(), MemoryError::InvalidAlignment(12));
    }

    #[test]
    fn test_neighbours_keep_canaries() {
        let pool = MemoryPool::new(64, 3, 64).unwrap();
        let l = layout(64, 64);
        let blocks: Vec<_> = (0..3).map(|_| pool.allocate(l).unwrap()).collect();

        for (i, block) in blocks.iter().enumerate() {
            unsafe { block.as_ptr().write_bytes(0xA0 + i as u8, 64) };
        }

        unsafe { pool.deallocate(blocks[1], l).unwrap() };
        let again = pool.allocate(l).unwrap();
        unsafe { again.as_ptr().write_bytes(0xFF, 64) };

        for (i, block) in [(0, blocks[0]), (2, blocks[2])] {
            let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), 64) };
            assert!(bytes.iter().all(|&b| b == 0xA0 + i as u8));
        }
    }

    #[cfg(feature = "dev-checks")]
    #[test]
    fn test_pool_detects_double_free_and_foreign_pointers() {
        let pool = MemoryPool::new(16, 4, 16).unwrap();
        let l = layout(16, 16);
        let block = pool.allocate(l).unwrap();

        let inside = NonNull::new(unsafe { block.as_ptr().add(4) }).unwrap();
        assert_eq!(
            unsafe { pool.deallocate(inside, l) },
            Err(MemoryError::ForeignPointer(BackingStore::Pool))
        );

        unsafe { pool.deallocate(block, l).unwrap() };
        assert_eq!(unsafe { pool.deallocate(block, l) }, Err(MemoryError::DoubleFree));
        pool.check_consistency().unwrap();
    }
}
