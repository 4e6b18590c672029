//! # Allocator Adapters
//!
//! Container-compatible allocators over the strategies of the
//! [`MemoryManager`](crate::MemoryManager).
//!
//! Each adapter resolves its backing store once, when it is constructed, and
//! keeps a shared handle to it. Resolution falls back along a fixed chain when
//! a strategy is not configured:
//!
//! | adapter                          | chain                                   |
//! |----------------------------------|-----------------------------------------|
//! | [`GeneralPurposeAllocator`]      | general purpose → heap                  |
//! | [`StackAllocator`]               | stack → general purpose → heap          |
//! | [`PoolAllocator`]                | pool of the element layout → heap       |
//! | [`ThreadPrivateStackAllocator`]  | own private stack, or general purpose → heap if disabled |
//!
//! Failures are never redirected to another store. A failed allocation is
//! logged and reported as [`AllocError`]; a failed deallocation is logged and,
//! with the `dev-checks` feature, panics.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use allocator_api2::alloc::{AllocError, Allocator};

use crate::error::MemoryResult;
use crate::interface::{BackingStore, MemoryInterface};
use crate::manager::MemoryManager;

// =============================================================================
// SHARED ALLOCATION PATHS
// =============================================================================

/// Aligned non-null address for zero-sized blocks.
#[inline]
fn dangling(layout: Layout) -> NonNull<u8> {
    NonNull::new(layout.align() as *mut u8).unwrap_or(NonNull::dangling())
}

#[inline]
fn is_aligned(ptr: NonNull<u8>, align: usize) -> bool {
    ptr.as_ptr() as usize % align == 0
}

fn allocate_from(memory: &dyn MemoryInterface, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
    if layout.size() == 0 {
        return Ok(NonNull::slice_from_raw_parts(dangling(layout), 0));
    }

    match memory.allocate(layout) {
        Ok(ptr) => Ok(NonNull::slice_from_raw_parts(ptr, layout.size())),
        Err(error) => {
            tracing::error!(
                store = %memory.backing_store(),
                size = layout.size(),
                align = layout.align(),
                %error,
                "allocation failed"
            );
            Err(AllocError)
        }
    }
}

unsafe fn deallocate_to(memory: &dyn MemoryInterface, ptr: NonNull<u8>, layout: Layout) {
    if layout.size() == 0 {
        return;
    }

    if let Err(error) = memory.deallocate(ptr, layout) {
        tracing::error!(store = %memory.backing_store(), size = layout.size(), %error, "deallocation failed");
        if cfg!(feature = "dev-checks") && !std::thread::panicking() {
            panic!("deallocation from {} failed: {error}", memory.backing_store());
        }
    }
}

unsafe fn grow_in(
    memory: &dyn MemoryInterface,
    ptr: NonNull<u8>,
    old_layout: Layout,
    new_layout: Layout,
    zeroed: bool,
) -> Result<NonNull<[u8]>, AllocError> {
    let old_size = old_layout.size();
    let new_size = new_layout.size();

    let block = if old_size != 0 && is_aligned(ptr, new_layout.align()) && memory.resize_in_place(ptr, old_layout, new_size)
    {
        NonNull::slice_from_raw_parts(ptr, new_size)
    } else {
        let block = allocate_from(memory, new_layout)?;
        ptr::copy_nonoverlapping(ptr.as_ptr(), block.cast::<u8>().as_ptr(), old_size);
        deallocate_to(memory, ptr, old_layout);
        block
    };

    if zeroed {
        block.cast::<u8>().as_ptr().add(old_size).write_bytes(0, new_size - old_size);
    }
    Ok(block)
}

unsafe fn shrink_in(
    memory: &dyn MemoryInterface,
    ptr: NonNull<u8>,
    old_layout: Layout,
    new_layout: Layout,
) -> Result<NonNull<[u8]>, AllocError> {
    let new_size = new_layout.size();

    if new_size == 0 {
        deallocate_to(memory, ptr, old_layout);
        return Ok(NonNull::slice_from_raw_parts(dangling(new_layout), 0));
    }
    if is_aligned(ptr, new_layout.align()) && memory.resize_in_place(ptr, old_layout, new_size) {
        return Ok(NonNull::slice_from_raw_parts(ptr, new_size));
    }

    let block = allocate_from(memory, new_layout)?;
    ptr::copy_nonoverlapping(ptr.as_ptr(), block.cast::<u8>().as_ptr(), new_size);
    deallocate_to(memory, ptr, old_layout);
    Ok(block)
}

#[inline]
fn same_store(a: &Arc<dyn MemoryInterface>, b: &Arc<dyn MemoryInterface>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

/// Implements `Allocator`, equality and the store accessor for an adapter
/// holding a `memory: Arc<dyn MemoryInterface>` field.
macro_rules! memory_allocator {
    ($adapter:ty) => {
        // SAFETY: blocks come from the resolved store, which keeps them valid
        // until they are deallocated; clones share the same store.
        unsafe impl Allocator for $adapter {
            #[inline]
            fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
                allocate_from(&*self.memory, layout)
            }

            #[inline]
            unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
                deallocate_to(&*self.memory, ptr, layout);
            }

            unsafe fn grow(
                &self,
                ptr: NonNull<u8>,
                old_layout: Layout,
                new_layout: Layout,
            ) -> Result<NonNull<[u8]>, AllocError> {
                grow_in(&*self.memory, ptr, old_layout, new_layout, false)
            }

            unsafe fn grow_zeroed(
                &self,
                ptr: NonNull<u8>,
                old_layout: Layout,
                new_layout: Layout,
            ) -> Result<NonNull<[u8]>, AllocError> {
                grow_in(&*self.memory, ptr, old_layout, new_layout, true)
            }

            unsafe fn shrink(
                &self,
                ptr: NonNull<u8>,
                old_layout: Layout,
                new_layout: Layout,
            ) -> Result<NonNull<[u8]>, AllocError> {
                shrink_in(&*self.memory, ptr, old_layout, new_layout)
            }
        }

        impl PartialEq for $adapter {
            fn eq(&self, other: &Self) -> bool {
                same_store(&self.memory, &other.memory)
            }
        }

        impl Eq for $adapter {}

        impl $adapter {
            /// The strategy this allocator resolved to.
            #[must_use]
            pub fn backing_store(&self) -> BackingStore {
                self.memory.backing_store()
            }
        }
    };
}

// =============================================================================
// ADAPTERS
// =============================================================================

/// Allocator over the general-purpose memory.
///
/// # Example
///
/// ```rust,ignore
/// let mut values = Vec::new_in(GeneralPurposeAllocator::new());
/// values.extend(0..100u32);
/// ```
#[derive(Clone, Debug)]
pub struct GeneralPurposeAllocator {
    memory: Arc<dyn MemoryInterface>,
}

impl GeneralPurposeAllocator {
    /// Resolves against the process-wide manager.
    #[must_use]
    pub fn new() -> Self {
        Self::from_manager(MemoryManager::instance())
    }

    /// Resolves against `manager`.
    #[must_use]
    pub fn from_manager(manager: &MemoryManager) -> Self {
        Self { memory: manager.resolve_general_purpose() }
    }
}

impl Default for GeneralPurposeAllocator {
    fn default() -> Self {
        Self::new()
    }
}

memory_allocator!(GeneralPurposeAllocator);

/// Allocator over the shared memory stack.
///
/// Blocks must be released in reverse allocation order. Growing the most
/// recent block happens in place.
#[derive(Clone, Debug)]
pub struct StackAllocator {
    memory: Arc<dyn MemoryInterface>,
}

impl StackAllocator {
    /// Resolves against the process-wide manager.
    #[must_use]
    pub fn new() -> Self {
        Self::from_manager(MemoryManager::instance())
    }

    /// Resolves against `manager`.
    #[must_use]
    pub fn from_manager(manager: &MemoryManager) -> Self {
        Self { memory: manager.resolve_stack() }
    }
}

impl Default for StackAllocator {
    fn default() -> Self {
        Self::new()
    }
}

memory_allocator!(StackAllocator);

/// Allocator over the memory pool matching one element layout.
///
/// Requests for other layouts are refused by the pool. Without a matching
/// pool the allocator serves from the heap.
#[derive(Clone, Debug)]
pub struct PoolAllocator {
    memory: Arc<dyn MemoryInterface>,
}

impl PoolAllocator {
    /// Resolves the pool for `T` against the process-wide manager.
    #[must_use]
    pub fn for_type<T>() -> Self {
        Self::for_layout(Layout::new::<T>())
    }

    /// Resolves the pool for `T` against `manager`.
    #[must_use]
    pub fn for_type_in<T>(manager: &MemoryManager) -> Self {
        Self::for_layout_in(Layout::new::<T>(), manager)
    }

    /// Resolves the pool for `layout` against the process-wide manager.
    #[must_use]
    pub fn for_layout(layout: Layout) -> Self {
        Self::for_layout_in(layout, MemoryManager::instance())
    }

    /// Resolves the pool for `layout` against `manager`.
    #[must_use]
    pub fn for_layout_in(layout: Layout, manager: &MemoryManager) -> Self {
        Self { memory: manager.resolve_pool(layout.size(), layout.align()) }
    }
}

memory_allocator!(PoolAllocator);

/// Allocator over the calling thread's private memory stack.
///
/// The allocator is neither `Send` nor `Sync`, so containers using it stay on
/// the thread that owns the stack.
#[derive(Clone)]
pub struct ThreadPrivateStackAllocator {
    memory: Arc<dyn MemoryInterface>,
    _owner_thread: PhantomData<*const ()>,
}

impl ThreadPrivateStackAllocator {
    /// Resolves against the process-wide manager.
    ///
    /// # Errors
    ///
    /// Fails if thread-private memory is enabled but the calling thread has
    /// not created its private stack.
    pub fn new() -> MemoryResult<Self> {
        Self::from_manager(MemoryManager::instance())
    }

    /// Resolves against `manager`.
    ///
    /// # Errors
    ///
    /// See [`ThreadPrivateStackAllocator::new`].
    pub fn from_manager(manager: &MemoryManager) -> MemoryResult<Self> {
        Ok(Self { memory: manager.resolve_thread_private()?, _owner_thread: PhantomData })
    }
}

impl fmt::Debug for ThreadPrivateStackAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPrivateStackAllocator").field("memory", &self.memory).finish()
    }
}

memory_allocator!(ThreadPrivateStackAllocator);
