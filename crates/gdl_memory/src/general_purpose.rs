//! # General-Purpose Memory
//!
//! A heap replacement inside one pre-allocated arena.
//!
//! Free blocks form an address-sorted list threaded through the arena itself;
//! each free block starts with its size and the offset of the next free block.
//! Allocation is first fit with splitting. Deallocation coalesces with both
//! neighbours, so fragmentation only persists while blocks are live.
//!
//! Every allocated block carries a header right in front of the user pointer:
//!
//! ```text
//!  block start                    user pointer
//!  │                              │
//!  ▼                              ▼
//!  ┌─────────┬────────────┬──────┬──────────────────────┐
//!  │ padding │ block size │ start│ user data            │
//!  └─────────┴────────────┴──────┴──────────────────────┘
//! ```

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::ptr::NonNull;

use parking_lot::Mutex;

use crate::arena::{align_up, RawArena, WORD};
use crate::dev_check::dev_check;
use crate::error::{MemoryError, MemoryResult};
use crate::interface::{BackingStore, MemoryInterface};

/// Bytes in front of every user pointer.
const HEADER: usize = 2 * WORD;

/// Smallest block that can sit in the free list.
const MIN_FREE_BLOCK: usize = 2 * WORD;

/// End-of-list marker.
const NIL: usize = usize::MAX;

/// A free-list allocator over a fixed arena.
///
/// # Example
///
/// ```rust,ignore
/// let memory = GeneralPurposeMemory::new(1024 * 1024)?;
/// let block = memory.allocate(Layout::array::<u32>(100)?)?;
/// unsafe { memory.deallocate(block, Layout::array::<u32>(100)?)? };
/// ```
#[derive(Debug)]
pub struct GeneralPurposeMemory {
    arena: RawArena,
    /// Usable bytes (arena capacity rounded down to whole words).
    usable: usize,
    state: Mutex<FreeListState>,
}

#[derive(Debug)]
struct FreeListState {
    /// Offset of the first free block.
    head: usize,
    num_allocations: usize,
}

impl GeneralPurposeMemory {
    /// Creates the memory over `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` cannot hold a single block or the arena
    /// cannot be allocated.
    pub fn new(size: usize) -> MemoryResult<Self> {
        let usable = size & !(WORD - 1);
        if usable < HEADER + MIN_FREE_BLOCK {
            return Err(MemoryError::InvalidSize(format!(
                "general purpose memory of {size} bytes cannot hold a single block"
            )));
        }

        let arena = RawArena::new(usable, 2 * WORD)?;
        arena.write_word(0, usable);
        arena.write_word(WORD, NIL);

        Ok(Self { arena, usable, state: Mutex::new(FreeListState { head: 0, num_allocations: 0 }) })
    }

    /// Total size in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.usable
    }

    /// Number of live blocks.
    #[must_use]
    pub fn count_allocated_memory_blocks(&self) -> usize {
        self.state.lock().num_allocations
    }

    /// Number of blocks in the free list.
    #[must_use]
    pub fn count_free_memory_blocks(&self) -> usize {
        let state = self.state.lock();
        self.free_blocks(state.head).count()
    }

    /// Sum of all free block sizes.
    #[must_use]
    pub fn free_bytes(&self) -> usize {
        let state = self.state.lock();
        self.free_blocks(state.head).map(|(_, size)| size).sum()
    }

    /// Iterates `(offset, size)` of every free block in address order.
    fn free_blocks(&self, head: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        let mut current = head;
        std::iter::from_fn(move || {
            if current == NIL {
                return None;
            }
            let block = current;
            current = self.next_of(block);
            Some((block, self.size_of(block)))
        })
    }

    #[inline]
    fn size_of(&self, block: usize) -> usize {
        self.arena.read_word(block)
    }

    #[inline]
    fn next_of(&self, block: usize) -> usize {
        self.arena.read_word(block + WORD)
    }

    #[inline]
    fn write_free_block(&self, block: usize, size: usize, next: usize) {
        self.arena.write_word(block, size);
        self.arena.write_word(block + WORD, next);
    }

    /// Points `previous` (or the list head) at `block`.
    #[inline]
    fn link(&self, state: &mut FreeListState, previous: usize, block: usize) {
        if previous == NIL {
            state.head = block;
        } else {
            self.arena.write_word(previous + WORD, block);
        }
    }
}

impl MemoryInterface for GeneralPurposeMemory {
    fn allocate(&self, layout: Layout) -> MemoryResult<NonNull<u8>> {
        dev_check!(layout.size() == 0, MemoryError::ZeroSizedAllocation(BackingStore::GeneralPurpose));

        let base = self.arena.base_addr();
        let mut state = self.state.lock();

        let mut previous = NIL;
        let mut current = state.head;
        while current != NIL {
            let block_size = self.size_of(current);
            let next = self.next_of(current);

            let user = align_up(base + current + HEADER, layout.align()) - base;
            let needed = align_up(user + layout.size(), WORD) - current;

            if needed <= block_size {
                let remainder = block_size - needed;
                let taken = if remainder >= MIN_FREE_BLOCK {
                    let rest = current + needed;
                    self.write_free_block(rest, remainder, next);
                    self.link(&mut state, previous, rest);
                    needed
                } else {
                    self.link(&mut state, previous, next);
                    block_size
                };

                self.arena.write_word(user - HEADER, taken);
                self.arena.write_word(user - WORD, current);
                state.num_allocations += 1;
                return Ok(self.arena.ptr_at(user));
            }

            previous = current;
            current = next;
        }

        let available = self.free_blocks(state.head).map(|(_, size)| size).sum();
        Err(MemoryError::OutOfMemory { resource: BackingStore::GeneralPurpose, requested: layout.size(), available })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) -> MemoryResult<()> {
        let foreign = MemoryError::ForeignPointer(BackingStore::GeneralPurpose);
        let offset = self.arena.offset_of(ptr).ok_or(foreign.clone())?;
        let header = offset.checked_sub(HEADER).ok_or(foreign)?;

        let mut state = self.state.lock();
        if state.num_allocations == 0 {
            return Err(MemoryError::NothingAllocated(BackingStore::GeneralPurpose));
        }

        let mut block = self.arena.read_word(header + WORD);
        let mut size = self.arena.read_word(header);
        let end = block.checked_add(size).unwrap_or(usize::MAX);
        if block > header || end > self.usable || end <= offset {
            return Err(MemoryError::Corrupted {
                resource: BackingStore::GeneralPurpose,
                details: format!("invalid header in front of offset {offset}"),
            });
        }

        // Find the free neighbours around the block
        let mut previous = NIL;
        let mut next = state.head;
        while next != NIL && next < block {
            previous = next;
            next = self.next_of(next);
        }

        dev_check!(
            previous != NIL && previous + self.size_of(previous) > block,
            MemoryError::DoubleFree
        );
        dev_check!(next != NIL && block + size > next, MemoryError::DoubleFree);

        if previous != NIL && previous + self.size_of(previous) == block {
            size += self.size_of(previous);
            block = previous;
        } else {
            self.link(&mut state, previous, block);
        }

        if next != NIL && block + size == next {
            let after = self.next_of(next);
            self.write_free_block(block, size + self.size_of(next), after);
        } else {
            self.write_free_block(block, size, next);
        }

        state.num_allocations -= 1;
        Ok(())
    }

    fn backing_store(&self) -> BackingStore {
        BackingStore::GeneralPurpose
    }
}
