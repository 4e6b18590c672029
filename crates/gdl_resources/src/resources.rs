//! # Resources Lifecycle
//!
//! Brings the memory manager and the thread pool up in dependency order and
//! takes them down in reverse:
//!
//! ```text
//!   bootstrap:  configure memory ─> initialize memory ─> start workers
//!                                                        (init: private stack)
//!   shutdown:   close workers ─> deinitialize memory
//!               (deinit: drop private stack)
//! ```

use gdl_cpu::{PoolHandle, ThreadPool, ThreadPoolConfig, WorkerRoutine};
use gdl_memory::{MemoryManager, MemorySize};

use crate::config::ResourcesConfig;
use crate::error::ResourcesResult;

/// Initialized memory manager plus a running thread pool.
#[derive(Debug)]
pub struct Resources {
    memory: &'static MemoryManager,
    thread_pool: ThreadPool,
    config: ResourcesConfig,
}

impl Resources {
    /// Sets up the process-wide memory manager and starts the thread pool.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the manager was already set up,
    /// or a worker thread cannot be started.
    pub fn bootstrap(config: ResourcesConfig) -> ResourcesResult<Self> {
        Self::bootstrap_in(config, MemoryManager::instance())
    }

    /// Like [`Resources::bootstrap`], with an explicit memory manager.
    ///
    /// # Errors
    ///
    /// See [`Resources::bootstrap`].
    pub fn bootstrap_in(config: ResourcesConfig, memory: &'static MemoryManager) -> ResourcesResult<Self> {
        config.validate()?;
        config.memory.apply(memory)?;
        memory.initialize()?;

        let thread_pool = match Self::start_thread_pool(&config, memory) {
            Ok(pool) => pool,
            Err(error) => {
                if let Err(cleanup) = memory.deinitialize() {
                    tracing::warn!(%cleanup, "memory manager left initialized after failed bootstrap");
                }
                return Err(error);
            }
        };

        tracing::info!(
            threads = thread_pool.num_threads(),
            worker_stacks = config.worker_stack_size.is_some(),
            "resources bootstrapped"
        );
        Ok(Self { memory, thread_pool, config })
    }

    fn start_thread_pool(config: &ResourcesConfig, memory: &'static MemoryManager) -> ResourcesResult<ThreadPool> {
        let pool = ThreadPool::from_config(&ThreadPoolConfig { initial_threads: 0, ..config.thread_pool.clone() })?;
        let threads = config.thread_pool.initial_threads;
        match config.worker_stack_size {
            Some(size) => pool.start_threads_with(threads, worker_stack_routine(memory, size))?,
            None => pool.start_threads(threads)?,
        }
        Ok(pool)
    }

    /// The memory manager.
    #[must_use]
    pub fn memory(&self) -> &'static MemoryManager {
        self.memory
    }

    /// The thread pool.
    #[must_use]
    pub fn thread_pool(&self) -> &ThreadPool {
        &self.thread_pool
    }

    /// The configuration the resources were built from.
    #[must_use]
    pub fn config(&self) -> &ResourcesConfig {
        &self.config
    }

    /// Starts `num_threads` more workers, with private stacks if configured.
    ///
    /// # Errors
    ///
    /// Fails if a worker thread cannot be started.
    pub fn start_threads(&self, num_threads: usize) -> ResourcesResult<()> {
        match self.config.worker_stack_size {
            Some(size) => self.thread_pool.start_threads_with(num_threads, worker_stack_routine(self.memory, size))?,
            None => self.thread_pool.start_threads(num_threads)?,
        }
        Ok(())
    }

    /// Shuts the thread pool down, then deinitializes the memory manager.
    ///
    /// # Errors
    ///
    /// Returns the memory manager's error first (e.g. memory still in use),
    /// otherwise the exceptions the workers reported.
    pub fn shutdown(self) -> ResourcesResult<()> {
        let Self { memory, thread_pool, .. } = self;
        let pool_result = thread_pool.deinitialize();
        memory.deinitialize()?;
        pool_result?;
        tracing::info!("resources shut down");
        Ok(())
    }
}

/// Worker routine owning a private memory stack for the thread's lifetime.
fn worker_stack_routine(memory: &'static MemoryManager, size: MemorySize) -> WorkerRoutine {
    WorkerRoutine::new()
        .on_init(move |_: &PoolHandle| memory.create_private_memory_stack_for_this_thread(size))
        .on_deinit(move |_: &PoolHandle| memory.delete_private_memory_stack_for_this_thread())
}
