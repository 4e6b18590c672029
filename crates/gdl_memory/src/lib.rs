//! # GDL Memory
//!
//! Pre-sized allocation strategies behind one memory manager:
//! - General-purpose free-list memory replacing the heap
//! - A LIFO memory stack and per-thread private stacks
//! - Fixed-size memory pools
//! - The platform heap as universal fallback
//!
//! ## Architecture Rules
//!
//! 1. **Configure, then initialize** - stores are declared during setup and
//!    built once; configuration is locked afterwards
//! 2. **Resolve once** - allocator adapters pick their store when constructed
//! 3. **Fail loudly** - misuse and exhaustion are errors, never silent
//!    redirection to another store
//!
//! ## Example
//!
//! ```rust,ignore
//! use gdl_memory::{general_purpose_vec, make_pool_box, MemoryManager, MemorySize};
//!
//! let manager = MemoryManager::instance();
//! manager.create_general_purpose_memory(MemorySize::megabytes(1))?;
//! manager.create_memory_pool(32, 1000, 0)?;
//! manager.initialize()?;
//!
//! let mut values = general_purpose_vec::<u32>();
//! values.extend(0..100);
//! let block = make_pool_box([0u64; 4])?;
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

mod arena;
mod dev_check;

pub mod allocator;
pub mod boxed;
pub mod config;
pub mod counter;
pub mod error;
pub mod general_purpose;
pub mod heap;
pub mod interface;
pub mod manager;
pub mod pool;
pub mod size;
pub mod stack;

pub use allocator::{GeneralPurposeAllocator, PoolAllocator, StackAllocator, ThreadPrivateStackAllocator};
pub use boxed::{
    general_purpose_vec, make_general_purpose_box, make_general_purpose_box_in, make_pool_box, make_pool_box_in,
    make_stack_box, make_stack_box_in, make_thread_private_stack_box, make_thread_private_stack_box_in, stack_vec,
    thread_private_stack_vec, GeneralPurposeBox, GeneralPurposeDeleter, GeneralPurposeVec, PoolBox, PoolDeleter,
    StackBox, StackDeleter, StackVec, ThreadPrivateStackBox, ThreadPrivateStackDeleter, ThreadPrivateStackVec,
};
pub use config::{MemoryConfig, PoolConfig};
pub use counter::{CountingAllocator, HeapAllocationCounter};
pub use error::{MemoryError, MemoryResult};
pub use general_purpose::GeneralPurposeMemory;
pub use heap::HeapMemory;
pub use interface::{BackingStore, MemoryInterface};
pub use manager::{MemoryManager, PoolKey};
pub use pool::MemoryPool;
pub use size::MemorySize;
pub use stack::{MemoryStack, ThreadPrivateMemoryStack};
