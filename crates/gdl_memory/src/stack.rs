//! # Memory Stacks
//!
//! Bump-pointer stores whose blocks must be released in reverse allocation
//! order.
//!
//! Every block is preceded by a two-word header holding the cursor and the
//! top block from before the allocation, so releasing the top block restores
//! the previous state exactly.
//!
//! ```text
//!  ┌────────┬─────────┬────────┬─────────┬──────────────── ─ ─
//!  │ header │ block 0 │ header │ block 1 │  free
//!  └────────┴─────────┴────────┴─────────┴──────────────── ─ ─
//!                                        ▲ cursor
//! ```
//!
//! [`MemoryStack`] is shared behind a mutex. [`ThreadPrivateMemoryStack`] is
//! lock-free and refuses every access from a thread other than its owner.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::arena::{align_up, RawArena, WORD};
use crate::dev_check::dev_check;
use crate::error::{MemoryError, MemoryResult};
use crate::interface::{BackingStore, MemoryInterface};

/// Bytes in front of every block.
const HEADER: usize = 2 * WORD;

/// Encodes "no previous block" in a header.
const NO_BLOCK: usize = usize::MAX;

/// The LIFO bookkeeping shared by both stack flavours.
#[derive(Debug)]
struct StackCore {
    arena: RawArena,
    /// First free byte.
    cursor: usize,
    /// Offset of the most recent live block.
    top: Option<usize>,
    num_allocations: usize,
    kind: BackingStore,
}

impl StackCore {
    fn new(size: usize, kind: BackingStore) -> MemoryResult<Self> {
        Ok(Self { arena: RawArena::new(size, WORD)?, cursor: 0, top: None, num_allocations: 0, kind })
    }

    fn allocate(&mut self, layout: Layout) -> MemoryResult<NonNull<u8>> {
        dev_check!(layout.size() == 0, MemoryError::ZeroSizedAllocation(self.kind));

        let base = self.arena.base_addr();
        let block = align_up(base + self.cursor + HEADER, layout.align()) - base;
        let end = block + layout.size();
        if end > self.arena.capacity() {
            return Err(MemoryError::OutOfMemory {
                resource: self.kind,
                requested: layout.size(),
                available: self.arena.capacity() - self.cursor,
            });
        }

        self.arena.write_word(block - HEADER, self.cursor);
        self.arena.write_word(block - HEADER + WORD, self.top.unwrap_or(NO_BLOCK));
        self.cursor = end;
        self.top = Some(block);
        self.num_allocations += 1;

        Ok(self.arena.ptr_at(block))
    }

    fn deallocate(&mut self, ptr: NonNull<u8>) -> MemoryResult<()> {
        let offset = self.arena.offset_of(ptr).ok_or(MemoryError::ForeignPointer(self.kind))?;
        let top = self.top.ok_or(MemoryError::NothingAllocated(self.kind))?;
        dev_check!(offset != top, MemoryError::OutOfOrderDeallocation);
        let header = offset.checked_sub(HEADER).ok_or(MemoryError::ForeignPointer(self.kind))?;

        let previous_cursor = self.arena.read_word(header);
        let previous_top = self.arena.read_word(header + WORD);
        self.cursor = previous_cursor;
        self.top = (previous_top != NO_BLOCK).then_some(previous_top);
        self.num_allocations = self.num_allocations.saturating_sub(1);
        Ok(())
    }

    fn resize_in_place(&mut self, ptr: NonNull<u8>, new_size: usize) -> bool {
        match self.arena.offset_of(ptr) {
            Some(offset) if Some(offset) == self.top && offset + new_size <= self.arena.capacity() => {
                self.cursor = offset + new_size;
                true
            }
            _ => false,
        }
    }
}

// =============================================================================
// SHARED STACK
// =============================================================================

/// A memory stack usable from any thread.
///
/// # Example
///
/// ```rust,ignore
/// let stack = MemoryStack::new(1024 * 1024)?;
/// let a = stack.allocate(Layout::new::<u64>())?;
/// let b = stack.allocate(Layout::new::<[u8; 64]>())?;
///
/// // Reverse order only
/// unsafe { stack.deallocate(b, Layout::new::<[u8; 64]>())? };
/// unsafe { stack.deallocate(a, Layout::new::<u64>())? };
/// ```
#[derive(Debug)]
pub struct MemoryStack {
    core: Mutex<StackCore>,
}

impl MemoryStack {
    /// Creates a stack over `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the arena cannot be allocated.
    pub fn new(size: usize) -> MemoryResult<Self> {
        Ok(Self { core: Mutex::new(StackCore::new(size, BackingStore::Stack)?) })
    }

    /// Total size in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.core.lock().arena.capacity()
    }

    /// Bytes in use, including headers and padding.
    #[must_use]
    pub fn used(&self) -> usize {
        self.core.lock().cursor
    }

    /// Number of live blocks.
    #[must_use]
    pub fn num_allocations(&self) -> usize {
        self.core.lock().num_allocations
    }
}

impl MemoryInterface for MemoryStack {
    fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<u8>> {
        self.core.lock().allocate(layout)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) -> MemoryResult<()> {
        self.core.lock().deallocate(ptr)
    }

    unsafe fn resize_in_place(&self, ptr: NonNull<u8>, _layout: Layout, new_size: usize) -> bool {
        self.core.lock().resize_in_place(ptr, new_size)
    }

    fn backing_store(&self) -> BackingStore {
        BackingStore::Stack
    }
}

// =============================================================================
// THREAD-PRIVATE STACK
// =============================================================================

/// A memory stack owned by the thread that created it.
///
/// No lock is taken; instead every operation verifies that it runs on the
/// owning thread and fails with [`MemoryError::WrongThread`] otherwise.
#[derive(Debug)]
pub struct ThreadPrivateMemoryStack {
    owner: ThreadId,
    core: UnsafeCell<StackCore>,
    /// Mirror of the live block count, readable from any thread.
    live: AtomicUsize,
}

// SAFETY: `core` is only touched through `with_core`, which rejects every
// thread but `owner`, and no reference escapes the closure. Other threads only
// read the atomic `live` counter.
unsafe impl Sync for ThreadPrivateMemoryStack {}

impl ThreadPrivateMemoryStack {
    /// Creates a stack over `size` bytes owned by the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the arena cannot be allocated.
    pub fn new(size: usize) -> MemoryResult<Self> {
        Ok(Self {
            owner: thread::current().id(),
            core: UnsafeCell::new(StackCore::new(size, BackingStore::ThreadPrivateStack)?),
            live: AtomicUsize::new(0),
        })
    }

    /// The owning thread.
    #[inline]
    #[must_use]
    pub const fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Number of live blocks.
    #[must_use]
    pub fn num_allocations(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Bytes in use, including headers and padding.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::WrongThread`] off the owning thread.
    pub fn used(&self) -> MemoryResult<usize> {
        self.with_core(|core| core.cursor)
    }

    fn with_core<R>(&self, f: impl FnOnce(&mut StackCore) -> R) -> MemoryResult<R> {
        if thread::current().id() != self.owner {
            return Err(MemoryError::WrongThread);
        }
        // SAFETY: only the owning thread gets here, and `f` cannot reenter
        // this stack, so the mutable borrow is unique.
        let core = unsafe { &mut *self.core.get() };
        let result = f(core);
        self.live.store(core.num_allocations, Ordering::Release);
        Ok(result)
    }
}

impl MemoryInterface for ThreadPrivateMemoryStack {
    fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<u8>> {
        self.with_core(|core| core.allocate(layout))?
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) -> MemoryResult<()> {
        self.with_core(|core| core.deallocate(ptr))?
    }

    unsafe fn resize_in_place(&self, ptr: NonNull<u8>, _layout: Layout, new_size: usize) -> bool {
        self.with_core(|core| core.resize_in_place(ptr, new_size)).unwrap_or(false)
    }

    fn backing_store(&self) -> BackingStore {
        BackingStore::ThreadPrivateStack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn layout(size: usize, align: usize) -> Layout {
        Layout::from_size_align(size, align).unwrap()
    }

    #[test]
    fn test_stack_lifo_roundtrip() {
        let stack = MemoryStack::new(1024).unwrap();

        let a = stack.allocate(layout(10, 1)).unwrap();
        let b = stack.allocate(layout(64, 64)).unwrap();
        assert_eq!(b.as_ptr() as usize % 64, 0);
        assert_eq!(stack.num_allocations(), 2);

        unsafe {
            stack.deallocate(b, layout(64, 64)).unwrap();
            stack.deallocate(a, layout(10, 1)).unwrap();
        }
        assert_eq!(stack.num_allocations(), 0);
        assert_eq!(stack.used(), 0);
    }

    #[cfg(feature = "dev-checks")]
    #[test]
    fn test_stack_rejects_out_of_order_deallocation() {
        let stack = MemoryStack::new(1024).unwrap();
        let a = stack.allocate(layout(16, 8)).unwrap();
        let b = stack.allocate(layout(16, 8)).unwrap();
        let used = stack.used();

        assert_eq!(
            unsafe { stack.deallocate(a, layout(16, 8)) },
            Err(MemoryError::OutOfOrderDeallocation)
        );
        // The stack is unchanged and still releases in order
        assert_eq!(stack.used(), used);
        unsafe {
            stack.deallocate(b, layout(16, 8)).unwrap();
            stack.deallocate(a, layout(16, 8)).unwrap();
        }
    }

    #[test]
    fn test_stack_overflow() {
        let stack = MemoryStack::new(64).unwrap();
        assert!(matches!(
            stack.allocate(layout(128, 8)),
            Err(MemoryError::OutOfMemory { resource: BackingStore::Stack, requested: 128, .. })
        ));
    }

    #[test]
    fn test_stack_reuses_released_space() {
        let stack = MemoryStack::new(256).unwrap();
        let a = stack.allocate(layout(32, 8)).unwrap();
        unsafe { stack.deallocate(a, layout(32, 8)).unwrap() };
        let b = stack.allocate(layout(32, 8)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stack_resize_top_block_only() {
        let stack = MemoryStack::new(256).unwrap();
        let a = stack.allocate(layout(16, 8)).unwrap();
        assert!(unsafe { stack.resize_in_place(a, layout(16, 8), 64) });

        let b = stack.allocate(layout(16, 8)).unwrap();
        assert!(b.as_ptr() as usize >= a.as_ptr() as usize + 64);
        assert!(!unsafe { stack.resize_in_place(a, layout(64, 8), 80) });
        assert!(!unsafe { stack.resize_in_place(b, layout(16, 8), 1024) });
    }

    #[test]
    fn test_stack_keeps_canaries() {
        let stack = MemoryStack::new(1024).unwrap();
        let blocks: Vec<_> = (0..3).map(|_| stack.allocate(layout(32, 8)).unwrap()).collect();
        for (i, block) in blocks.iter().enumerate() {
            unsafe { block.as_ptr().write_bytes(0x10 * (i as u8 + 1), 32) };
        }

        unsafe { stack.deallocate(blocks[2], layout(32, 8)).unwrap() };
        let fresh = stack.allocate(layout(48, 8)).unwrap();
        unsafe { fresh.as_ptr().write_bytes(0xFF, 48) };

        for (i, block) in blocks.iter().take(2).enumerate() {
            let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), 32) };
            assert!(bytes.iter().all(|&b| b == 0x10 * (i as u8 + 1)));
        }
    }

    #[test]
    fn test_thread_private_stack_on_owner() {
        let stack = ThreadPrivateMemoryStack::new(512).unwrap();
        let a = stack.allocate(layout(24, 8)).unwrap();
        assert_eq!(stack.num_allocations(), 1);
        assert!(stack.used().unwrap() >= 24);
        unsafe { stack.deallocate(a, layout(24, 8)).unwrap() };
        assert_eq!(stack.num_allocations(), 0);
    }

    #[test]
    fn test_thread_private_stack_keeps_canaries() {
        let stack = ThreadPrivateMemoryStack::new(1024).unwrap();
        let blocks: Vec<_> = (0..3).map(|_| stack.allocate(layout(32, 8)).unwrap()).collect();
        for (i, block) in blocks.iter().enumerate() {
            unsafe { block.as_ptr().write_bytes(0x20 * (i as u8 + 1), 32) };
        }

        unsafe { stack.deallocate(blocks[2], layout(32, 8)).unwrap() };
        let fresh = stack.allocate(layout(48, 8)).unwrap();
        unsafe { fresh.as_ptr().write_bytes(0xFF, 48) };

        for (i, block) in blocks.iter().take(2).enumerate() {
            let bytes = unsafe { std::slice::from_raw_parts(block.as_ptr(), 32) };
            assert!(bytes.iter().all(|&b| b == 0x20 * (i as u8 + 1)));
        }

        unsafe {
            stack.deallocate(fresh, layout(48, 8)).unwrap();
            stack.deallocate(blocks[1], layout(32, 8)).unwrap();
            stack.deallocate(blocks[0], layout(32, 8)).unwrap();
        }
        assert_eq!(stack.num_allocations(), 0);
    }

    #[test]
    fn test_thread_private_stack_rejects_foreign_threads() {
        let stack = Arc::new(ThreadPrivateMemoryStack::new(512).unwrap());
        let block = stack.allocate(layout(8, 8)).unwrap();
        let address = block.as_ptr() as usize;

        let remote = Arc::clone(&stack);
        let (allocated, released) = std::thread::spawn(move || {
            let ptr = NonNull::new(address as *mut u8).unwrap();
            let allocated = remote.allocate(layout(8, 8)).map(|p| p.as_ptr() as usize);
            (allocated, unsafe { remote.deallocate(ptr, layout(8, 8)) })
        })
        .join()
        .unwrap();

        assert_eq!(allocated, Err(MemoryError::WrongThread));
        assert_eq!(released, Err(MemoryError::WrongThread));
        assert_eq!(stack.num_allocations(), 1);
        unsafe { stack.deallocate(block, layout(8, 8)).unwrap() };
    }
}
