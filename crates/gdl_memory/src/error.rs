//! # Memory Error Types
//!
//! All errors that can occur while configuring the memory manager or while
//! allocating from one of its backing stores.

use thiserror::Error;

use crate::interface::BackingStore;

/// Errors that can occur in the memory subsystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// A configuration call was made after the setup phase ended.
    #[error("setup process already finished: `{operation}` must be called before initialize")]
    ConfigurationLocked {
        /// The rejected configuration call.
        operation: &'static str,
    },

    /// A unique resource was configured twice.
    #[error("{resource} already created")]
    AlreadyCreated {
        /// Description of the duplicated resource.
        resource: String,
    },

    /// `initialize` was called on an initialized manager.
    #[error("memory manager already initialized")]
    AlreadyInitialized,

    /// An operation required an initialized manager.
    #[error("memory manager not initialized")]
    NotInitialized,

    /// A backing store was requested before `initialize`.
    #[error("memory was requested before the memory manager was initialized")]
    MemoryRequestedBeforeInitialization,

    /// A backing store still holds live allocations.
    #[error("{resource} still has {allocations} live allocation(s)")]
    MemoryInUse {
        /// The store that is still in use.
        resource: BackingStore,
        /// Number of live allocations.
        allocations: usize,
    },

    /// Thread-private memory was used without being enabled.
    #[error("thread private memory is not enabled")]
    ThreadPrivateMemoryDisabled,

    /// The calling thread already owns a private memory stack.
    #[error("thread {thread} already has a private memory stack")]
    PrivateStackExists {
        /// Debug rendering of the thread id.
        thread: String,
    },

    /// The calling thread owns no private memory stack.
    #[error("thread {thread} has no private memory stack")]
    NoPrivateStack {
        /// Debug rendering of the thread id.
        thread: String,
    },

    /// A thread-private stack was accessed from a foreign thread.
    #[error("thread private memory stack accessed from a thread that does not own it")]
    WrongThread,

    /// A size parameter is not acceptable.
    #[error("invalid size: {0}")]
    InvalidSize(String),

    /// An alignment is not a power of two.
    #[error("invalid alignment: {0} is not a power of two")]
    InvalidAlignment(usize),

    /// The store cannot satisfy the request.
    #[error("{resource} out of memory: requested {requested} bytes, {available} bytes available")]
    OutOfMemory {
        /// The exhausted store.
        resource: BackingStore,
        /// Requested size in bytes.
        requested: usize,
        /// Free bytes left in the store.
        available: usize,
    },

    /// An allocator adapter could not obtain a block.
    #[error("allocation of {size} bytes from {resource} failed")]
    AllocationFailed {
        /// The store the adapter resolved to.
        resource: BackingStore,
        /// Requested size in bytes.
        size: usize,
    },

    /// A pool received a request of the wrong size.
    #[error("memory pool element size is {expected} bytes, requested {requested} bytes")]
    SizeMismatch {
        /// The pool element size.
        expected: usize,
        /// The requested size.
        requested: usize,
    },

    /// A pool received a request it cannot align.
    #[error("memory pool alignment is {provided}, requested {requested}")]
    AlignmentMismatch {
        /// The pool alignment.
        provided: usize,
        /// The requested alignment.
        requested: usize,
    },

    /// A zero-sized request reached a backing store.
    #[error("zero sized allocation requested from {0}")]
    ZeroSizedAllocation(BackingStore),

    /// A pointer does not belong to the store it was returned to.
    #[error("pointer does not belong to {0}")]
    ForeignPointer(BackingStore),

    /// A stack block was released while a newer block was still alive.
    #[error("memory stack blocks must be deallocated in reverse allocation order")]
    OutOfOrderDeallocation,

    /// A block was released twice.
    #[error("memory block released twice")]
    DoubleFree,

    /// A deallocation reached a store without live allocations.
    #[error("{0} has no live allocations")]
    NothingAllocated(BackingStore),

    /// The internal bookkeeping of a store is inconsistent.
    #[error("{resource} is corrupted: {details}")]
    Corrupted {
        /// The inconsistent store.
        resource: BackingStore,
        /// What was found.
        details: String,
    },
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
