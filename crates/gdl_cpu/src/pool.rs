//! # Thread Pool
//!
//! **Elastic worker threads over 1..N FIFO queues**
//!
//! ```text
//!   submit ──┐                  ┌──> Worker 0 ─┐
//!   submit ──┼──> [Queue 0..N] ─┼──> Worker 1 ─┼──> exception log
//!   caller ──┘   (FIFO each)    └──> Worker K ─┘
//!      └── try_execute_task (external threads drain too)
//! ```
//!
//! Workers poll the queues in index order and sleep briefly when idle; no
//! condition variable is involved, so no wakeup can be missed. Threads are
//! closed LIFO: the most recently started go first.
//!
//! Failures inside tasks never unwind into the caller. They are collected in
//! the exception log and surface through [`ThreadPool::propagate_exceptions`]
//! or [`ThreadPool::deinitialize`].

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::ThreadPoolConfig;
use crate::error::{ThreadPoolError, ThreadPoolResult};
use crate::exception_log::{run_guarded, ExceptionLog};
use crate::queue::ThreadPoolQueue;
use crate::task::{Task, TaskBase, TaskOutcome};
use crate::worker::{Worker, WorkerRoutine, WorkerState};

/// Queue of pending tasks.
pub type TaskQueue = ThreadPoolQueue<Box<dyn TaskBase>>;

/// State shared by the pool, its workers and every handle.
struct Shared<const N: usize> {
    queues: [TaskQueue; N],
    close_all: AtomicBool,
    exception_log: ExceptionLog,
    idle_sleep: Duration,
}

// =============================================================================
// POOL HANDLE
// =============================================================================

/// Cloneable access to a pool's queues and exception log.
///
/// Handed to custom main loops and hooks, and usable inside tasks to submit
/// follow-up work. It cannot start or close threads.
pub struct PoolHandle<const NUM_QUEUES: usize = 1> {
    shared: Arc<Shared<NUM_QUEUES>>,
}

impl<const NUM_QUEUES: usize> Clone for PoolHandle<NUM_QUEUES> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<const NUM_QUEUES: usize> PoolHandle<NUM_QUEUES> {
    fn queue(&self, index: usize) -> ThreadPoolResult<&TaskQueue> {
        self.shared.queues.get(index).ok_or(ThreadPoolError::InvalidQueue { index, count: NUM_QUEUES })
    }

    /// Number of queues.
    #[inline]
    #[must_use]
    pub const fn num_queues(&self) -> usize {
        NUM_QUEUES
    }

    /// Submits `function` to queue 0.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadPoolError::QueueInvalidated`] once the pool shuts down.
    pub fn submit<F, R>(&self, function: F) -> ThreadPoolResult<()>
    where
        F: FnOnce() -> R + Send + 'static,
        R: TaskOutcome,
    {
        self.submit_to(0, function)
    }

    /// Submits `function` to queue `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadPoolError::InvalidQueue`] for an index out of range and
    /// [`ThreadPoolError::QueueInvalidated`] once the pool shuts down.
    pub fn submit_to<F, R>(&self, index: usize, function: F) -> ThreadPoolResult<()>
    where
        F: FnOnce() -> R + Send + 'static,
        R: TaskOutcome,
    {
        self.queue(index)?
            .push(Task::boxed(function))
            .map_err(|_| ThreadPoolError::QueueInvalidated { index })
    }

    /// Runs one task of queue 0 in the calling thread. Returns whether a task
    /// was executed.
    pub fn try_execute_task(&self) -> bool {
        self.try_execute_task_from(0).unwrap_or(false)
    }

    /// Runs one task of queue `index` in the calling thread. Returns whether a
    /// task was executed.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadPoolError::InvalidQueue`] for an index out of range.
    pub fn try_execute_task_from(&self, index: usize) -> ThreadPoolResult<bool> {
        Ok(self.execute_from(self.queue(index)?))
    }

    /// Runs the first task found, trying the queues in index order.
    pub fn try_execute_any_task(&self) -> bool {
        self.shared.queues.iter().any(|queue| self.execute_from(queue))
    }

    fn execute_from(&self, queue: &TaskQueue) -> bool {
        match queue.try_pop() {
            Some(task) => {
                run_guarded(&self.shared.exception_log, || task.execute());
                true
            }
            None => false,
        }
    }

    /// Body of the default worker loop.
    pub(crate) fn run_default_iteration(&self) {
        if !self.try_execute_any_task() {
            thread::sleep(self.shared.idle_sleep);
        }
    }

    /// Whether any queue holds tasks.
    #[must_use]
    pub fn has_tasks(&self) -> bool {
        self.shared.queues.iter().any(|queue| !queue.is_empty())
    }

    /// Whether queue `index` holds tasks.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadPoolError::InvalidQueue`] for an index out of range.
    pub fn has_tasks_in(&self, index: usize) -> ThreadPoolResult<bool> {
        Ok(!self.queue(index)?.is_empty())
    }

    /// Tasks pending over all queues.
    #[must_use]
    pub fn num_tasks(&self) -> usize {
        self.shared.queues.iter().map(ThreadPoolQueue::len).sum()
    }

    /// Tasks pending in queue `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadPoolError::InvalidQueue`] for an index out of range.
    pub fn num_tasks_in(&self, index: usize) -> ThreadPoolResult<usize> {
        Ok(self.queue(index)?.len())
    }

    /// Whether the pool is shutting all threads down.
    #[inline]
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.shared.close_all.load(Ordering::Acquire)
    }

    /// Length of the exception log text.
    #[must_use]
    pub fn exception_log_size(&self) -> usize {
        self.shared.exception_log.size()
    }

    /// Copy of the exception log text.
    #[must_use]
    pub fn exception_log(&self) -> String {
        self.shared.exception_log.contents()
    }

    /// Empties the exception log.
    pub fn clear_exception_log(&self) {
        self.shared.exception_log.clear();
    }

    /// Surfaces the exceptions caught in worker threads. The log is kept.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadPoolError::WorkerExceptions`] with the log text if it
    /// is not empty.
    pub fn propagate_exceptions(&self) -> ThreadPoolResult<()> {
        let text = self.shared.exception_log.contents();
        if text.is_empty() {
            Ok(())
        } else {
            Err(ThreadPoolError::WorkerExceptions(text))
        }
    }

    pub(crate) fn exception_log_ref(&self) -> &ExceptionLog {
        &self.shared.exception_log
    }
}

impl<const NUM_QUEUES: usize> fmt::Debug for PoolHandle<NUM_QUEUES> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("num_queues", &NUM_QUEUES)
            .field("num_tasks", &self.num_tasks())
            .field("closing", &self.is_closing())
            .finish()
    }
}

// =============================================================================
// THREAD POOL
// =============================================================================

/// Pool of worker threads over `NUM_QUEUES` task queues.
///
/// # Example
///
/// ```rust,ignore
/// let pool: ThreadPool = ThreadPool::new(4)?;
/// pool.submit(|| println!("hello from a worker"))?;
/// while pool.has_tasks() {
///     pool.try_execute_task();
/// }
/// pool.deinitialize()?;
/// ```
pub struct ThreadPool<const NUM_QUEUES: usize = 1> {
    handle: PoolHandle<NUM_QUEUES>,
    workers: Mutex<Vec<Worker>>,
    next_worker_id: AtomicUsize,
}

impl<const NUM_QUEUES: usize> ThreadPool<NUM_QUEUES> {
    const HAS_QUEUES: () = assert!(NUM_QUEUES > 0, "the thread pool needs at least one queue");

    /// Creates the pool and starts `num_threads` workers.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadPoolError::Spawn`] if a thread cannot be started.
    pub fn new(num_threads: usize) -> ThreadPoolResult<Self> {
        Self::from_config(&ThreadPoolConfig::with_threads(num_threads))
    }

    /// Creates the pool described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadPoolError::Spawn`] if a thread cannot be started.
    pub fn from_config(config: &ThreadPoolConfig) -> ThreadPoolResult<Self> {
        let () = Self::HAS_QUEUES;

        let shared = Shared {
            queues: std::array::from_fn(|_| ThreadPoolQueue::new()),
            close_all: AtomicBool::new(false),
            exception_log: ExceptionLog::new(),
            idle_sleep: config.idle_sleep(),
        };
        let pool = Self {
            handle: PoolHandle { shared: Arc::new(shared) },
            workers: Mutex::new(Vec::new()),
            next_worker_id: AtomicUsize::new(0),
        };
        pool.start_threads(config.initial_threads)?;
        Ok(pool)
    }

    /// Handle for submitting and executing from other places.
    #[must_use]
    pub fn handle(&self) -> PoolHandle<NUM_QUEUES> {
        self.handle.clone()
    }

    // =========================================================================
    // THREADS
    // =========================================================================

    /// Starts `num_threads` workers running the default task loop.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadPoolError::Spawn`] if a thread cannot be started; the
    /// threads started before keep running.
    pub fn start_threads(&self, num_threads: usize) -> ThreadPoolResult<()> {
        self.start_threads_with(num_threads, WorkerRoutine::new())
    }

    /// Starts `num_threads` workers running `routine`.
    ///
    /// # Errors
    ///
    /// See [`ThreadPool::start_threads`].
    pub fn start_threads_with(&self, num_threads: usize, routine: WorkerRoutine<NUM_QUEUES>) -> ThreadPoolResult<()> {
        if num_threads == 0 {
            return Ok(());
        }
        let routine = Arc::new(routine);
        let mut workers = self.workers.lock();
        for _ in 0..num_threads {
            let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
            let worker = Worker::spawn(format!("gdl-worker-{id}"), self.handle.clone(), Arc::clone(&routine))?;
            workers.push(worker);
        }
        tracing::info!(started = num_threads, total = workers.len(), "worker threads started");
        Ok(())
    }

    /// Closes the `num_threads` most recently started workers and waits for
    /// them. Closes all if there are fewer.
    ///
    /// Running tasks are finished; queued tasks stay queued.
    pub fn close_threads(&self, num_threads: usize) {
        let mut workers = self.workers.lock();
        let keep = workers.len().saturating_sub(num_threads);
        let closing = workers.split_off(keep);
        for worker in &closing {
            worker.signal_close();
        }
        let closed = closing.len();
        for worker in closing.into_iter().rev() {
            worker.join();
        }
        tracing::info!(closed, remaining = workers.len(), "worker threads closed");
    }

    /// Closes every worker and waits for them.
    pub fn close_all_threads(&self) {
        let mut workers = self.workers.lock();
        self.handle.shared.close_all.store(true, Ordering::Release);
        let closed = workers.len();
        for worker in workers.drain(..).rev() {
            worker.join();
        }
        self.handle.shared.close_all.store(false, Ordering::Release);
        tracing::info!(closed, "all worker threads closed");
    }

    /// Number of worker threads.
    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.workers.lock().len()
    }

    /// Worker thread names, oldest first.
    #[must_use]
    pub fn thread_names(&self) -> Vec<String> {
        self.workers.lock().iter().map(|worker| worker.name().to_owned()).collect()
    }

    /// Worker lifecycle states, oldest first.
    #[must_use]
    pub fn thread_states(&self) -> Vec<WorkerState> {
        self.workers.lock().iter().map(Worker::state).collect()
    }

    // =========================================================================
    // TASKS
    // =========================================================================

    /// See [`PoolHandle::submit`].
    ///
    /// # Errors
    ///
    /// See [`PoolHandle::submit`].
    #[inline]
    pub fn submit<F, R>(&self, function: F) -> ThreadPoolResult<()>
    where
        F: FnOnce() -> R + Send + 'static,
        R: TaskOutcome,
    {
        self.handle.submit(function)
    }

    /// See [`PoolHandle::submit_to`].
    ///
    /// # Errors
    ///
    /// See [`PoolHandle::submit_to`].
    #[inline]
    pub fn submit_to<F, R>(&self, index: usize, function: F) -> ThreadPoolResult<()>
    where
        F: FnOnce() -> R + Send + 'static,
        R: TaskOutcome,
    {
        self.handle.submit_to(index, function)
    }

    /// See [`PoolHandle::try_execute_task`].
    #[inline]
    pub fn try_execute_task(&self) -> bool {
        self.handle.try_execute_task()
    }

    /// See [`PoolHandle::try_execute_task_from`].
    ///
    /// # Errors
    ///
    /// See [`PoolHandle::try_execute_task_from`].
    #[inline]
    pub fn try_execute_task_from(&self, index: usize) -> ThreadPoolResult<bool> {
        self.handle.try_execute_task_from(index)
    }

    /// See [`PoolHandle::has_tasks`].
    #[inline]
    #[must_use]
    pub fn has_tasks(&self) -> bool {
        self.handle.has_tasks()
    }

    /// See [`PoolHandle::has_tasks_in`].
    ///
    /// # Errors
    ///
    /// See [`PoolHandle::has_tasks_in`].
    #[inline]
    pub fn has_tasks_in(&self, index: usize) -> ThreadPoolResult<bool> {
        self.handle.has_tasks_in(index)
    }

    /// See [`PoolHandle::num_tasks`].
    #[inline]
    #[must_use]
    pub fn num_tasks(&self) -> usize {
        self.handle.num_tasks()
    }

    /// See [`PoolHandle::num_tasks_in`].
    ///
    /// # Errors
    ///
    /// See [`PoolHandle::num_tasks_in`].
    #[inline]
    pub fn num_tasks_in(&self, index: usize) -> ThreadPoolResult<usize> {
        self.handle.num_tasks_in(index)
    }

    // =========================================================================
    // EXCEPTIONS
    // =========================================================================

    /// See [`PoolHandle::exception_log_size`].
    #[inline]
    #[must_use]
    pub fn exception_log_size(&self) -> usize {
        self.handle.exception_log_size()
    }

    /// See [`PoolHandle::exception_log`].
    #[inline]
    #[must_use]
    pub fn exception_log(&self) -> String {
        self.handle.exception_log()
    }

    /// See [`PoolHandle::clear_exception_log`].
    #[inline]
    pub fn clear_exception_log(&self) {
        self.handle.clear_exception_log();
    }

    /// See [`PoolHandle::propagate_exceptions`].
    ///
    /// # Errors
    ///
    /// See [`PoolHandle::propagate_exceptions`].
    #[inline]
    pub fn propagate_exceptions(&self) -> ThreadPoolResult<()> {
        self.handle.propagate_exceptions()
    }

    /// Closes all threads, invalidates the queues and surfaces any exception
    /// caught by the workers.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadPoolError::WorkerExceptions`] if the exception log was
    /// not empty.
    pub fn deinitialize(self) -> ThreadPoolResult<()> {
        self.close_all_threads();
        for queue in &self.handle.shared.queues {
            queue.invalidate();
        }

        let text = self.handle.shared.exception_log.take();
        if text.is_empty() {
            Ok(())
        } else {
            Err(ThreadPoolError::WorkerExceptions(text))
        }
    }
}

impl<const NUM_QUEUES: usize> Drop for ThreadPool<NUM_QUEUES> {
    fn drop(&mut self) {
        let shared = &self.handle.shared;
        shared.close_all.store(true, Ordering::Release);

        // Queues go first, so no worker can pick up new work while we join
        for queue in &shared.queues {
            queue.invalidate();
            queue.clear();
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers.into_iter().rev() {
            worker.join();
        }

        let text = shared.exception_log.take();
        if !text.is_empty() {
            tracing::warn!("thread pool dropped with unpropagated worker exceptions:\n{text}");
        }
    }
}

impl<const NUM_QUEUES: usize> fmt::Debug for ThreadPool<NUM_QUEUES> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("num_queues", &NUM_QUEUES)
            .field("num_threads", &self.num_threads())
            .field("num_tasks", &self.num_tasks())
            .finish()
    }
}
