//! # Boxes and Containers
//!
//! Unique-ownership pointers and vectors over the allocator adapters.
//!
//! A box stores the allocator that produced its block and gives the block
//! back through it when dropped, so the deleter of each box type is its
//! allocator type and a block can never be released to the wrong store.

use std::alloc::Layout;

use allocator_api2::alloc::Allocator;
use allocator_api2::boxed::Box;
use allocator_api2::vec::Vec;

use crate::allocator::{GeneralPurposeAllocator, PoolAllocator, StackAllocator, ThreadPrivateStackAllocator};
use crate::error::{MemoryError, MemoryResult};
use crate::interface::BackingStore;
use crate::manager::MemoryManager;

/// Releases general-purpose blocks.
pub type GeneralPurposeDeleter = GeneralPurposeAllocator;
/// Releases pool blocks.
pub type PoolDeleter = PoolAllocator;
/// Releases memory stack blocks.
pub type StackDeleter = StackAllocator;
/// Releases thread-private stack blocks.
pub type ThreadPrivateStackDeleter = ThreadPrivateStackAllocator;

/// Unique pointer into the general-purpose memory.
pub type GeneralPurposeBox<T> = Box<T, GeneralPurposeDeleter>;
/// Unique pointer into the memory pool for `T`.
pub type PoolBox<T> = Box<T, PoolDeleter>;
/// Unique pointer into the memory stack.
pub type StackBox<T> = Box<T, StackDeleter>;
/// Unique pointer into the calling thread's private stack.
pub type ThreadPrivateStackBox<T> = Box<T, ThreadPrivateStackDeleter>;

// Containers are vectors only. `allocator_api2` has no `String`, so text goes
// into a `StackVec<u8>`. Pools serve exactly one element layout per block,
// which a growing buffer never requests, so pool-backed data lives in boxes:
// a map over a pool stores `PoolBox` values in a general-purpose container.

/// Vector over the general-purpose memory.
pub type GeneralPurposeVec<T> = Vec<T, GeneralPurposeAllocator>;
/// Vector over the memory stack.
pub type StackVec<T> = Vec<T, StackAllocator>;
/// Vector over the calling thread's private stack.
pub type ThreadPrivateStackVec<T> = Vec<T, ThreadPrivateStackAllocator>;

fn boxed_in<T, A: Allocator>(value: T, allocator: A, resource: BackingStore) -> MemoryResult<Box<T, A>> {
    Box::try_new_in(value, allocator)
        .map_err(|_| MemoryError::AllocationFailed { resource, size: Layout::new::<T>().size() })
}

// =============================================================================
// FACTORIES
// =============================================================================

/// Moves `value` into the general-purpose memory.
///
/// # Errors
///
/// Fails if the memory cannot hold `T`.
pub fn make_general_purpose_box<T>(value: T) -> MemoryResult<GeneralPurposeBox<T>> {
    make_general_purpose_box_in(value, MemoryManager::instance())
}

/// Moves `value` into the general-purpose memory of `manager`.
///
/// # Errors
///
/// Fails if the memory cannot hold `T`.
pub fn make_general_purpose_box_in<T>(value: T, manager: &MemoryManager) -> MemoryResult<GeneralPurposeBox<T>> {
    let allocator = GeneralPurposeAllocator::from_manager(manager);
    let resource = allocator.backing_store();
    boxed_in(value, allocator, resource)
}

/// Moves `value` into the pool for `T`, or onto the heap without one.
///
/// # Errors
///
/// Fails if the pool is exhausted.
pub fn make_pool_box<T>(value: T) -> MemoryResult<PoolBox<T>> {
    make_pool_box_in(value, MemoryManager::instance())
}

/// Moves `value` into the pool for `T` of `manager`.
///
/// # Errors
///
/// Fails if the pool is exhausted.
pub fn make_pool_box_in<T>(value: T, manager: &MemoryManager) -> MemoryResult<PoolBox<T>> {
    let allocator = PoolAllocator::for_type_in::<T>(manager);
    let resource = allocator.backing_store();
    boxed_in(value, allocator, resource)
}

/// Moves `value` onto the memory stack.
///
/// # Errors
///
/// Fails if the stack is exhausted.
pub fn make_stack_box<T>(value: T) -> MemoryResult<StackBox<T>> {
    make_stack_box_in(value, MemoryManager::instance())
}

/// Moves `value` onto the memory stack of `manager`.
///
/// # Errors
///
/// Fails if the stack is exhausted.
pub fn make_stack_box_in<T>(value: T, manager: &MemoryManager) -> MemoryResult<StackBox<T>> {
    let allocator = StackAllocator::from_manager(manager);
    let resource = allocator.backing_store();
    boxed_in(value, allocator, resource)
}

/// Moves `value` onto the calling thread's private stack.
///
/// # Errors
///
/// Fails if the thread has no private stack (while thread-private memory is
/// enabled) or the stack is exhausted.
pub fn make_thread_private_stack_box<T>(value: T) -> MemoryResult<ThreadPrivateStackBox<T>> {
    make_thread_private_stack_box_in(value, MemoryManager::instance())
}

/// Moves `value` onto the calling thread's private stack of `manager`.
///
/// # Errors
///
/// See [`make_thread_private_stack_box`].
pub fn make_thread_private_stack_box_in<T>(value: T, manager: &MemoryManager) -> MemoryResult<ThreadPrivateStackBox<T>> {
    let allocator = ThreadPrivateStackAllocator::from_manager(manager)?;
    let resource = allocator.backing_store();
    boxed_in(value, allocator, resource)
}

// =============================================================================
// CONTAINERS
// =============================================================================

/// An empty vector over the general-purpose memory.
#[must_use]
pub fn general_purpose_vec<T>() -> GeneralPurposeVec<T> {
    Vec::new_in(GeneralPurposeAllocator::new())
}

/// An empty vector over the memory stack.
#[must_use]
pub fn stack_vec<T>() -> StackVec<T> {
    Vec::new_in(StackAllocator::new())
}

/// An empty vector over the calling thread's private stack.
///
/// # Errors
///
/// See [`ThreadPrivateStackAllocator::new`].
pub fn thread_private_stack_vec<T>() -> MemoryResult<ThreadPrivateStackVec<T>> {
    Ok(Vec::new_in(ThreadPrivateStackAllocator::new()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::size::MemorySize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Tracked(u32);

    impl Drop for Tracked {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_boxes_destroy_and_release() {
        let manager = MemoryManager::new();
        manager.create_general_purpose_memory(MemorySize::kibibytes(4)).unwrap();
        manager.create_memory_stack(MemorySize::kibibytes(4)).unwrap();
        manager.create_memory_pool(std::mem::size_of::<Tracked>(), 2, 0).unwrap();
        manager.initialize().unwrap();

        let before = DROPS.load(Ordering::SeqCst);
        {
            let a = make_general_purpose_box_in(Tracked(1), &manager).unwrap();
            let b = make_stack_box_in(Tracked(2), &manager).unwrap();
            let c = make_pool_box_in(Tracked(3), &manager).unwrap();
            assert_eq!(Box::allocator(&c).backing_store(), BackingStore::Pool);
            assert_eq!(a.0 + b.0 + c.0, 6);
        }
        assert_eq!(DROPS.load(Ordering::SeqCst) - before, 3);

        // Everything went back to its store
        manager.deinitialize().unwrap();
    }

    #[test]
    fn test_exhausted_pool_reports_error() {
        let manager = MemoryManager::new();
        manager.create_memory_pool(8, 1, 0).unwrap();
        manager.initialize().unwrap();
        {
            let _first = make_pool_box_in(1u64, &manager).unwrap();
            assert_eq!(
                make_pool_box_in(2u64, &manager).unwrap_err(),
                MemoryError::AllocationFailed { resource: BackingStore::Pool, size: 8 }
            );
        }
        manager.deinitialize().unwrap();
    }

    #[test]
    fn test_pool_backed_entries_live_in_boxes() {
        let manager = MemoryManager::new();
        manager.create_general_purpose_memory(MemorySize::kibibytes(4)).unwrap();
        manager.create_memory_pool(std::mem::size_of::<[u64; 2]>(), 4, 0).unwrap();
        manager.initialize().unwrap();
        {
            // A growing buffer asks for several elements at once
            let mut buffer: Vec<[u64; 2], PoolAllocator> = Vec::new_in(PoolAllocator::for_type_in::<[u64; 2]>(&manager));
            assert!(buffer.try_reserve(1).is_err());

            let mut map: GeneralPurposeVec<(u32, PoolBox<[u64; 2]>)> =
                Vec::new_in(GeneralPurposeAllocator::from_manager(&manager));
            for key in 0..4u32 {
                map.push((key, make_pool_box_in([u64::from(key); 2], &manager).unwrap()));
            }
            let found = map.iter().find(|(key, _)| *key == 2).map(|(_, value)| **value);
            assert_eq!(found, Some([2, 2]));
            assert!(map.iter().all(|(_, value)| Box::allocator(value).backing_store() == BackingStore::Pool));
        }
        manager.deinitialize().unwrap();
    }

    #[test]
    fn test_thread_private_box_requires_stack() {
        let manager = MemoryManager::new();
        manager.enable_thread_private_memory().unwrap();
        manager.initialize().unwrap();

        assert!(matches!(make_thread_private_stack_box_in(1u8, &manager), Err(MemoryError::NoPrivateStack { .. })));
        manager.create_private_memory_stack_for_this_thread(MemorySize::kibibytes(1)).unwrap();
        {
            let value = make_thread_private_stack_box_in(9u8, &manager).unwrap();
            assert_eq!(*value, 9);
        }
        manager.delete_private_memory_stack_for_this_thread().unwrap();
        manager.deinitialize().unwrap();
    }
}
