//! # Memory Manager
//!
//! Owns every allocation strategy of the process and hands them out to the
//! allocator adapters.
//!
//! ## Lifecycle
//!
//! ```text
//!   setup ──initialize──▶ running ──deinitialize──▶ setup
//!     │                      │
//!   create_*()           getters, thread-private stacks
//! ```
//!
//! `create_*` calls only record the configuration; the stores are built by
//! [`MemoryManager::initialize`] and released by
//! [`MemoryManager::deinitialize`]. Asking for a store before initialization
//! ends the setup phase for good: the allocator that asked would already have
//! fallen back to the heap, so initializing afterwards is refused.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::{MemoryError, MemoryResult};
use crate::general_purpose::GeneralPurposeMemory;
use crate::heap::HeapMemory;
use crate::interface::{BackingStore, MemoryInterface};
use crate::pool::MemoryPool;
use crate::size::MemorySize;
use crate::stack::{MemoryStack, ThreadPrivateMemoryStack};

static INSTANCE: Lazy<MemoryManager> = Lazy::new(MemoryManager::new);

/// Identifies a memory pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolKey {
    /// Size of one element in bytes.
    pub element_size: usize,
    /// Alignment of every element.
    pub alignment: usize,
}

impl PoolKey {
    /// Builds the key a pool is registered under. An `alignment` of zero
    /// defaults to the element size, or to the largest power of two dividing
    /// it when the element size itself is not a power of two.
    #[must_use]
    pub const fn new(element_size: usize, alignment: usize) -> Self {
        let alignment = if alignment != 0 {
            alignment
        } else if element_size == 0 || element_size.is_power_of_two() {
            element_size
        } else {
            1 << element_size.trailing_zeros()
        };
        Self { element_size, alignment }
    }
}

/// Configuration recorded before initialization.
#[derive(Debug, Default)]
struct Setup {
    general_purpose: Option<usize>,
    stack: Option<usize>,
    pools: BTreeMap<PoolKey, usize>,
    thread_private: bool,
}

/// Stores alive between `initialize` and `deinitialize`.
#[derive(Debug)]
struct Stores {
    general_purpose: Option<Arc<GeneralPurposeMemory>>,
    stack: Option<Arc<MemoryStack>>,
    pools: BTreeMap<PoolKey, Arc<MemoryPool>>,
}

#[derive(Debug, Default)]
struct ManagerState {
    setup: Setup,
    stores: Option<Stores>,
    setup_finished: bool,
    requested_uninitialized: bool,
}

impl ManagerState {
    /// Marks a getter call. Returns the stores if initialized.
    fn request(&mut self) -> Option<&Stores> {
        if self.stores.is_none() {
            self.setup_finished = true;
            self.requested_uninitialized = true;
        }
        self.stores.as_ref()
    }

    fn ensure_thread_private_memory(&self) -> MemoryResult<()> {
        if self.stores.is_none() {
            return Err(MemoryError::NotInitialized);
        }
        if !self.setup.thread_private {
            return Err(MemoryError::ThreadPrivateMemoryDisabled);
        }
        Ok(())
    }

    fn ensure_configurable(&self, operation: &'static str) -> MemoryResult<()> {
        if self.setup_finished {
            return Err(MemoryError::ConfigurationLocked { operation });
        }
        Ok(())
    }
}

/// The owner of all memory strategies.
///
/// Use [`MemoryManager::instance`] for the process-wide manager, or
/// [`MemoryManager::new`] for an independent memory context (tests, tools).
///
/// # Example
///
/// ```rust,ignore
/// let manager = MemoryManager::instance();
/// manager.create_general_purpose_memory(MemorySize::megabytes(1))?;
/// manager.create_memory_stack(MemorySize::megabytes(1))?;
/// manager.create_memory_pool(32, 1000, 0)?;
/// manager.initialize()?;
///
/// // ... allocate through the adapters ...
///
/// manager.deinitialize()?;
/// ```
#[derive(Debug)]
pub struct MemoryManager {
    heap: Arc<HeapMemory>,
    state: Mutex<ManagerState>,
    private_stacks: Mutex<HashMap<ThreadId, Arc<ThreadPrivateMemoryStack>>>,
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager {
    /// Creates an empty, uninitialized manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: Arc::new(HeapMemory::new()),
            state: Mutex::new(ManagerState::default()),
            private_stacks: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide manager, constructed on first use.
    #[must_use]
    pub fn instance() -> &'static Self {
        &INSTANCE
    }

    // =========================================================================
    // SETUP
    // =========================================================================

    /// Configures the general-purpose memory.
    ///
    /// # Errors
    ///
    /// Fails after setup has finished, if it was already configured, or for a
    /// zero size.
    pub fn create_general_purpose_memory(&self, size: MemorySize) -> MemoryResult<()> {
        let mut state = self.state.lock();
        state.ensure_configurable("create_general_purpose_memory")?;
        if state.setup.general_purpose.is_some() {
            return Err(MemoryError::AlreadyCreated { resource: BackingStore::GeneralPurpose.to_string() });
        }
        let size = nonzero(size, "general purpose memory")?;

        tracing::debug!(size, "general purpose memory configured");
        state.setup.general_purpose = Some(size);
        Ok(())
    }

    /// Configures the shared memory stack.
    ///
    /// # Errors
    ///
    /// Fails after setup has finished, if it was already configured, or for a
    /// zero size.
    pub fn create_memory_stack(&self, size: MemorySize) -> MemoryResult<()> {
        let mut state = self.state.lock();
        state.ensure_configurable("create_memory_stack")?;
        if state.setup.stack.is_some() {
            return Err(MemoryError::AlreadyCreated { resource: BackingStore::Stack.to_string() });
        }
        let size = nonzero(size, "memory stack")?;

        tracing::debug!(size, "memory stack configured");
        state.setup.stack = Some(size);
        Ok(())
    }

    /// Configures a pool of `num_elements` blocks of `element_size` bytes.
    ///
    /// An `alignment` of zero selects the default described in
    /// [`PoolKey::new`].
    ///
    /// # Errors
    ///
    /// Fails after setup has finished, for a duplicate `(size, alignment)`
    /// key, for zero sizes, or for an alignment that is not a power of two.
    pub fn create_memory_pool(&self, element_size: usize, num_elements: usize, alignment: usize) -> MemoryResult<()> {
        let mut state = self.state.lock();
        state.ensure_configurable("create_memory_pool")?;
        if element_size == 0 || num_elements == 0 {
            return Err(MemoryError::InvalidSize(format!(
                "memory pool needs a positive element size and count, got {element_size} x {num_elements}"
            )));
        }

        let key = PoolKey::new(element_size, alignment);
        if !key.alignment.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment(key.alignment));
        }
        if state.setup.pools.contains_key(&key) {
            return Err(MemoryError::AlreadyCreated {
                resource: format!("memory pool with element size {element_size} and alignment {}", key.alignment),
            });
        }

        tracing::debug!(element_size, num_elements, alignment = key.alignment, "memory pool configured");
        state.setup.pools.insert(key, num_elements);
        Ok(())
    }

    /// Allows threads to register private memory stacks.
    ///
    /// # Errors
    ///
    /// Fails after setup has finished or if already enabled.
    pub fn enable_thread_private_memory(&self) -> MemoryResult<()> {
        let mut state = self.state.lock();
        state.ensure_configurable("enable_thread_private_memory")?;
        if state.setup.thread_private {
            return Err(MemoryError::AlreadyCreated { resource: "thread private memory".into() });
        }
        state.setup.thread_private = true;
        Ok(())
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Builds every configured store and locks the configuration.
    ///
    /// # Errors
    ///
    /// Fails if already initialized, if memory was requested before, or if a
    /// store cannot be allocated (the manager then stays uninitialized).
    pub fn initialize(&self) -> MemoryResult<()> {
        let mut state = self.state.lock();
        if state.stores.is_some() {
            return Err(MemoryError::AlreadyInitialized);
        }
        if state.requested_uninitialized {
            return Err(MemoryError::MemoryRequestedBeforeInitialization);
        }

        let setup = &state.setup;
        let general_purpose = setup.general_purpose.map(GeneralPurposeMemory::new).transpose()?.map(Arc::new);
        let stack = setup.stack.map(MemoryStack::new).transpose()?.map(Arc::new);
        let pools = setup
            .pools
            .iter()
            .map(|(&key, &num_elements)| {
                MemoryPool::new(key.element_size, num_elements, key.alignment).map(|pool| (key, Arc::new(pool)))
            })
            .collect::<MemoryResult<BTreeMap<_, _>>>()?;

        tracing::info!(
            general_purpose = ?setup.general_purpose,
            stack = ?setup.stack,
            pools = pools.len(),
            thread_private = setup.thread_private,
            "memory manager initialized"
        );

        state.stores = Some(Stores { general_purpose, stack, pools });
        state.setup_finished = true;
        Ok(())
    }

    /// Releases every store, including all thread-private stacks, and returns
    /// to the setup phase with an empty configuration.
    ///
    /// # Errors
    ///
    /// Fails if not initialized, or if any store still has live allocations;
    /// nothing is released in that case.
    pub fn deinitialize(&self) -> MemoryResult<()> {
        let mut state = self.state.lock();
        let mut private_stacks = self.private_stacks.lock();
        let stores = state.stores.as_ref().ok_or(MemoryError::NotInitialized)?;

        let in_use = |resource: BackingStore, allocations: usize| {
            if allocations == 0 {
                Ok(())
            } else {
                Err(MemoryError::MemoryInUse { resource, allocations })
            }
        };
        if let Some(memory) = &stores.general_purpose {
            in_use(BackingStore::GeneralPurpose, memory.count_allocated_memory_blocks())?;
        }
        if let Some(stack) = &stores.stack {
            in_use(BackingStore::Stack, stack.num_allocations())?;
        }
        for pool in stores.pools.values() {
            in_use(BackingStore::Pool, pool.num_allocations())?;
        }
        for stack in private_stacks.values() {
            in_use(BackingStore::ThreadPrivateStack, stack.num_allocations())?;
        }

        let released_private_stacks = private_stacks.len();
        private_stacks.clear();
        *state = ManagerState::default();

        tracing::info!(released_private_stacks, "memory manager deinitialized");
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) succeeded and no
    /// [`deinitialize`](Self::deinitialize) followed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.lock().stores.is_some()
    }

    // =========================================================================
    // GETTERS
    // =========================================================================

    /// The general-purpose memory, if configured and initialized.
    #[must_use]
    pub fn general_purpose_memory(&self) -> Option<Arc<dyn MemoryInterface>> {
        let mut state = self.state.lock();
        let memory = state.request()?.general_purpose.clone()?;
        Some(memory as Arc<dyn MemoryInterface>)
    }

    /// The shared memory stack, if configured and initialized.
    #[must_use]
    pub fn memory_stack(&self) -> Option<Arc<dyn MemoryInterface>> {
        let mut state = self.state.lock();
        let stack = state.request()?.stack.clone()?;
        Some(stack as Arc<dyn MemoryInterface>)
    }

    /// The pool serving `element_size` bytes at `alignment`.
    ///
    /// An exact key match wins; otherwise a pool with the same element size
    /// and a stricter alignment is returned. Pools of other sizes never are.
    #[must_use]
    pub fn memory_pool(&self, element_size: usize, alignment: usize) -> Option<Arc<dyn MemoryInterface>> {
        let mut state = self.state.lock();
        let stores = state.request()?;
        let key = PoolKey::new(element_size, alignment);

        let pool = stores.pools.get(&key).or_else(|| {
            stores
                .pools
                .range(key..)
                .take_while(|(candidate, _)| candidate.element_size == element_size)
                .map(|(_, pool)| pool)
                .next()
        })?;
        Some(Arc::clone(pool) as Arc<dyn MemoryInterface>)
    }

    /// The platform heap. Always available.
    #[must_use]
    pub fn heap_memory(&self) -> Arc<dyn MemoryInterface> {
        Arc::clone(&self.heap) as Arc<dyn MemoryInterface>
    }

    // =========================================================================
    // THREAD-PRIVATE MEMORY
    // =========================================================================

    /// Whether thread-private memory is enabled for the running setup.
    #[must_use]
    pub fn is_thread_private_memory_enabled(&self) -> bool {
        let state = self.state.lock();
        state.stores.is_some() && state.setup.thread_private
    }

    /// Registers a private memory stack of `size` bytes for the calling thread.
    ///
    /// # Errors
    ///
    /// Fails if the manager is not initialized, thread-private memory is not
    /// enabled, or the thread already owns a stack.
    pub fn create_private_memory_stack_for_this_thread(&self, size: MemorySize) -> MemoryResult<()> {
        // Held until the insert so a concurrent deinitialize cannot slip in
        let state = self.state.lock();
        state.ensure_thread_private_memory()?;
        let size = nonzero(size, "thread private memory stack")?;

        let id = thread::current().id();
        let mut stacks = self.private_stacks.lock();
        if stacks.contains_key(&id) {
            return Err(MemoryError::PrivateStackExists { thread: format!("{id:?}") });
        }
        stacks.insert(id, Arc::new(ThreadPrivateMemoryStack::new(size)?));

        tracing::debug!(thread = ?id, size, "thread private memory stack created");
        Ok(())
    }

    /// Releases the calling thread's private memory stack.
    ///
    /// # Errors
    ///
    /// Fails if the thread owns no stack or the stack still has live
    /// allocations.
    pub fn delete_private_memory_stack_for_this_thread(&self) -> MemoryResult<()> {
        let id = thread::current().id();
        let mut stacks = self.private_stacks.lock();
        let stack = stacks.get(&id).ok_or_else(|| MemoryError::NoPrivateStack { thread: format!("{id:?}") })?;

        let allocations = stack.num_allocations();
        if allocations != 0 {
            return Err(MemoryError::MemoryInUse { resource: BackingStore::ThreadPrivateStack, allocations });
        }
        stacks.remove(&id);

        tracing::debug!(thread = ?id, "thread private memory stack deleted");
        Ok(())
    }

    /// The calling thread's private memory stack, if it registered one.
    #[must_use]
    pub fn thread_private_memory_stack(&self) -> Option<Arc<dyn MemoryInterface>> {
        let stack = self.private_stacks.lock().get(&thread::current().id()).cloned()?;
        Some(stack as Arc<dyn MemoryInterface>)
    }

    /// Number of registered thread-private stacks.
    #[must_use]
    pub fn num_private_memory_stacks(&self) -> usize {
        self.private_stacks.lock().len()
    }

    // =========================================================================
    // RESOLUTION
    // =========================================================================

    /// General-purpose memory, else the heap.
    pub(crate) fn resolve_general_purpose(&self) -> Arc<dyn MemoryInterface> {
        self.general_purpose_memory().unwrap_or_else(|| self.heap_memory())
    }

    /// Memory stack, else general-purpose memory, else the heap.
    pub(crate) fn resolve_stack(&self) -> Arc<dyn MemoryInterface> {
        self.memory_stack().unwrap_or_else(|| self.resolve_general_purpose())
    }

    /// Matching pool, else the heap.
    pub(crate) fn resolve_pool(&self, element_size: usize, alignment: usize) -> Arc<dyn MemoryInterface> {
        self.memory_pool(element_size, alignment).unwrap_or_else(|| self.heap_memory())
    }

    /// The calling thread's private stack when thread-private memory is
    /// enabled, otherwise the general-purpose chain.
    pub(crate) fn resolve_thread_private(&self) -> MemoryResult<Arc<dyn MemoryInterface>> {
        if !self.is_thread_private_memory_enabled() {
            return Ok(self.resolve_general_purpose());
        }
        self.thread_private_memory_stack()
            .ok_or_else(|| MemoryError::NoPrivateStack { thread: format!("{:?}", thread::current().id()) })
    }
}

fn nonzero(size: MemorySize, what: &str) -> MemoryResult<usize> {
    match size.num_bytes() {
        0 => Err(MemoryError::InvalidSize(format!("{what} size must be greater than zero"))),
        bytes => Ok(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::alloc::Layout;

    fn configured() -> MemoryManager {
        let manager = MemoryManager::new();
        manager.create_general_purpose_memory(MemorySize::kibibytes(64)).unwrap();
        manager.create_memory_stack(MemorySize::kibibytes(64)).unwrap();
        manager.create_memory_pool(32, 100, 0).unwrap();
        manager.create_memory_pool(64, 100, 16).unwrap();
        manager
    }

    #[test]
    fn test_configuration_locked_after_initialize() {
        let manager = configured();
        manager.initialize().unwrap();

        assert!(matches!(
            manager.create_general_purpose_memory(MemorySize::kibibytes(1)),
            Err(MemoryError::ConfigurationLocked { .. })
        ));
        assert!(matches!(manager.create_memory_stack(MemorySize::kibibytes(1)), Err(MemoryError::ConfigurationLocked { .. })));
        assert!(matches!(manager.create_memory_pool(8, 8, 8), Err(MemoryError::ConfigurationLocked { .. })));
        assert!(matches!(manager.enable_thread_private_memory(), Err(MemoryError::ConfigurationLocked { .. })));
        assert_eq!(manager.initialize(), Err(MemoryError::AlreadyInitialized));

        manager.deinitialize().unwrap();
    }

    #[test]
    fn test_duplicates_rejected() {
        let manager = configured();
        assert!(matches!(
            manager.create_general_purpose_memory(MemorySize::kibibytes(1)),
            Err(MemoryError::AlreadyCreated { .. })
        ));
        assert!(matches!(manager.create_memory_stack(MemorySize::kibibytes(1)), Err(MemoryError::AlreadyCreated { .. })));
        assert!(matches!(manager.create_memory_pool(32, 10, 32), Err(MemoryError::AlreadyCreated { .. })));
        // Same size, different alignment is a different pool
        manager.create_memory_pool(32, 10, 8).unwrap();
    }

    #[test]
    fn test_invalid_configuration() {
        let manager = MemoryManager::new();
        assert!(matches!(manager.create_general_purpose_memory(MemorySize::bytes(0)), Err(MemoryError::InvalidSize(_))));
        assert!(matches!(manager.create_memory_pool(0, 10, 0), Err(MemoryError::InvalidSize(_))));
        assert_eq!(manager.create_memory_pool(24, 10, 12), Err(MemoryError::InvalidAlignment(12)));
    }

    #[test]
    fn test_request_before_initialize_blocks_initialization() {
        let manager = configured();
        assert!(manager.general_purpose_memory().is_none());
        assert_eq!(manager.initialize(), Err(MemoryError::MemoryRequestedBeforeInitialization));
        assert!(matches!(manager.create_memory_pool(8, 8, 8), Err(MemoryError::ConfigurationLocked { .. })));
    }

    #[test]
    fn test_deinitialize_requires_initialization() {
        let manager = MemoryManager::new();
        assert_eq!(manager.deinitialize(), Err(MemoryError::NotInitialized));
    }

    #[test]
    #[allow(unsafe_code)]
    fn test_deinitialize_refuses_live_allocations() {
        let manager = configured();
        manager.initialize().unwrap();

        let stack = manager.memory_stack().unwrap();
        let layout = Layout::new::<u64>();
        let block = stack.allocate(layout).unwrap();
        assert_eq!(
            manager.deinitialize(),
            Err(MemoryError::MemoryInUse { resource: BackingStore::Stack, allocations: 1 })
        );
        assert!(manager.is_initialized());

        unsafe { stack.deallocate(block, layout).unwrap() };
        manager.deinitialize().unwrap();
        assert!(!manager.is_initialized());
    }

    #[test]
    fn test_second_cycle_behaves_like_first() {
        let manager = MemoryManager::new();
        for _ in 0..2 {
            manager.create_general_purpose_memory(MemorySize::kibibytes(4)).unwrap();
            manager.create_memory_pool(16, 4, 0).unwrap();
            manager.initialize().unwrap();

            assert!(manager.general_purpose_memory().is_some());
            assert!(manager.memory_stack().is_none());
            assert!(manager.memory_pool(16, 16).is_some());
            assert!(manager.create_memory_stack(MemorySize::kibibytes(1)).is_err());

            manager.deinitialize().unwrap();
        }
    }

    #[test]
    fn test_pool_lookup() {
        let manager = configured();
        manager.initialize().unwrap();

        assert!(manager.memory_pool(32, 32).is_some());
        // Looser alignment is served by the stricter pool
        assert!(manager.memory_pool(64, 8).is_some());
        assert!(manager.memory_pool(64, 32).is_none());
        assert!(manager.memory_pool(48, 16).is_none());
        assert_eq!(manager.resolve_pool(48, 16).backing_store(), BackingStore::Heap);

        manager.deinitialize().unwrap();
    }

    #[test]
    fn test_resolution_chains() {
        let manager = MemoryManager::new();
        manager.create_general_purpose_memory(MemorySize::kibibytes(4)).unwrap();
        manager.initialize().unwrap();

        assert_eq!(manager.resolve_general_purpose().backing_store(), BackingStore::GeneralPurpose);
        assert_eq!(manager.resolve_stack().backing_store(), BackingStore::GeneralPurpose);
        assert_eq!(manager.resolve_thread_private().unwrap().backing_store(), BackingStore::GeneralPurpose);
        manager.deinitialize().unwrap();

        let empty = MemoryManager::new();
        empty.initialize().unwrap();
        assert_eq!(empty.resolve_stack().backing_store(), BackingStore::Heap);
        empty.deinitialize().unwrap();
    }

    #[test]
    fn test_thread_private_stacks() {
        let manager = MemoryManager::new();
        assert_eq!(
            manager.create_private_memory_stack_for_this_thread(MemorySize::kibibytes(1)),
            Err(MemoryError::NotInitialized)
        );
        manager.enable_thread_private_memory().unwrap();
        manager.initialize().unwrap();
        assert!(manager.is_thread_private_memory_enabled());

        assert!(matches!(manager.resolve_thread_private(), Err(MemoryError::NoPrivateStack { .. })));
        manager.create_private_memory_stack_for_this_thread(MemorySize::kibibytes(1)).unwrap();
        assert!(matches!(
            manager.create_private_memory_stack_for_this_thread(MemorySize::kibibytes(1)),
            Err(MemoryError::PrivateStackExists { .. })
        ));
        assert_eq!(
            manager.resolve_thread_private().unwrap().backing_store(),
            BackingStore::ThreadPrivateStack
        );

        std::thread::scope(|scope| {
            scope.spawn(|| {
                assert!(manager.thread_private_memory_stack().is_none());
                manager.create_private_memory_stack_for_this_thread(MemorySize::kibibytes(1)).unwrap();
            });
        });
        assert_eq!(manager.num_private_memory_stacks(), 2);

        manager.delete_private_memory_stack_for_this_thread().unwrap();
        assert!(matches!(
            manager.delete_private_memory_stack_for_this_thread(),
            Err(MemoryError::NoPrivateStack { .. })
        ));

        // The remaining stack belongs to the finished thread; deinitialize
        // releases it.
        manager.deinitialize().unwrap();
        assert_eq!(manager.num_private_memory_stacks(), 0);
    }

    #[test]
    fn test_deinitialize_racing_stack_creation_leaves_nothing_behind() {
        let manager = MemoryManager::new();
        for _ in 0..200 {
            manager.enable_thread_private_memory().unwrap();
            manager.initialize().unwrap();

            let barrier = std::sync::Barrier::new(2);
            std::thread::scope(|scope| {
                let creator = scope.spawn(|| {
                    barrier.wait();
                    manager.create_private_memory_stack_for_this_thread(MemorySize::kibibytes(1))
                });
                barrier.wait();
                manager.deinitialize().unwrap();
                match creator.join().unwrap() {
                    Ok(()) | Err(MemoryError::NotInitialized) => {}
                    other => panic!("unexpected result {other:?}"),
                }
            });

            assert!(!manager.is_initialized());
            assert_eq!(manager.num_private_memory_stacks(), 0);
        }
    }

    #[test]
    fn test_thread_private_disabled() {
        let manager = MemoryManager::new();
        manager.initialize().unwrap();
        assert_eq!(
            manager.create_private_memory_stack_for_this_thread(MemorySize::kibibytes(1)),
            Err(MemoryError::ThreadPrivateMemoryDisabled)
        );
        manager.deinitialize().unwrap();
    }
}
