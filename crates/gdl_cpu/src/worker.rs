//! # Worker Threads
//!
//! Lifecycle of one pool thread:
//!
//! ```text
//!   Starting ──init ok──> Running ──close flag──> Closing ──deinit──> Closed
//!       │                                            ▲
//!       └──────────────init failed───────────────────┘
//! ```
//!
//! Every step runs inside the exception harness, so a failing hook or loop
//! body is logged and the thread still reaches `Closed`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::{ThreadPoolError, ThreadPoolResult};
use crate::exception_log::run_guarded;
use crate::pool::PoolHandle;
use crate::task::{TaskOutcome, TaskResult};

/// Lifecycle state of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// Thread spawned, init hook running.
    Starting = 0,
    /// Main loop running.
    Running = 1,
    /// Main loop left, deinit hook running.
    Closing = 2,
    /// Thread finished.
    Closed = 3,
}

impl WorkerState {
    #[inline]
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

type MainLoop<const N: usize> = Box<dyn Fn(&PoolHandle<N>) + Send + Sync>;
type Hook<const N: usize> = Box<dyn Fn(&PoolHandle<N>) -> TaskResult + Send + Sync>;

/// What a worker thread runs: an optional main loop body replacing the
/// default task loop, plus optional init and deinit hooks.
///
/// The main loop body is called repeatedly until the thread is closed.
///
/// # Example
///
/// ```rust,ignore
/// let routine = WorkerRoutine::new()
///     .on_init(|_| manager.create_private_memory_stack_for_this_thread(size))
///     .on_deinit(|_| manager.delete_private_memory_stack_for_this_thread());
/// pool.start_threads_with(4, routine)?;
/// ```
pub struct WorkerRoutine<const NUM_QUEUES: usize = 1> {
    main_loop: Option<MainLoop<NUM_QUEUES>>,
    init: Option<Hook<NUM_QUEUES>>,
    deinit: Option<Hook<NUM_QUEUES>>,
}

impl<const NUM_QUEUES: usize> Default for WorkerRoutine<NUM_QUEUES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const NUM_QUEUES: usize> WorkerRoutine<NUM_QUEUES> {
    /// Default task loop, no hooks.
    #[must_use]
    pub fn new() -> Self {
        Self { main_loop: None, init: None, deinit: None }
    }

    /// Replaces the default task loop body.
    #[must_use]
    pub fn with_main_loop<F>(mut self, body: F) -> Self
    where
        F: Fn(&PoolHandle<NUM_QUEUES>) + Send + Sync + 'static,
    {
        self.main_loop = Some(Box::new(body));
        self
    }

    /// Runs `hook` once when the thread starts. If it fails, the main loop
    /// is skipped.
    #[must_use]
    pub fn on_init<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&PoolHandle<NUM_QUEUES>) -> R + Send + Sync + 'static,
        R: TaskOutcome,
    {
        self.init = Some(Box::new(move |pool| hook(pool).into_task_result()));
        self
    }

    /// Runs `hook` once before the thread finishes.
    #[must_use]
    pub fn on_deinit<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&PoolHandle<NUM_QUEUES>) -> R + Send + Sync + 'static,
        R: TaskOutcome,
    {
        self.deinit = Some(Box::new(move |pool| hook(pool).into_task_result()));
        self
    }
}

impl<const NUM_QUEUES: usize> fmt::Debug for WorkerRoutine<NUM_QUEUES> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRoutine")
            .field("custom_main_loop", &self.main_loop.is_some())
            .field("init", &self.init.is_some())
            .field("deinit", &self.deinit.is_some())
            .finish()
    }
}

/// A spawned pool thread with its individual close flag.
pub(crate) struct Worker {
    name: String,
    close: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a thread running `routine` against `pool`.
    pub(crate) fn spawn<const N: usize>(
        name: String,
        pool: PoolHandle<N>,
        routine: Arc<WorkerRoutine<N>>,
    ) -> ThreadPoolResult<Self> {
        let close = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(WorkerState::Starting as u8));

        let thread_close = Arc::clone(&close);
        let thread_state = Arc::clone(&state);
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || Self::run(&pool, &routine, &thread_close, &thread_state))
            .map_err(|e| ThreadPoolError::Spawn(e.to_string()))?;

        Ok(Self { name, close, state, thread: Some(thread) })
    }

    /// Thread body.
    fn run<const N: usize>(pool: &PoolHandle<N>, routine: &WorkerRoutine<N>, close: &AtomicBool, state: &AtomicU8) {
        let log = pool.exception_log_ref();

        let initialized = routine.init.as_ref().map_or(true, |init| run_guarded(log, || init(pool)));
        if initialized {
            state.store(WorkerState::Running as u8, Ordering::Release);
            run_guarded(log, || {
                while !close.load(Ordering::Acquire) && !pool.is_closing() {
                    match &routine.main_loop {
                        Some(body) => body(pool),
                        None => pool.run_default_iteration(),
                    }
                }
                Ok(())
            });
        }

        state.store(WorkerState::Closing as u8, Ordering::Release);
        if let Some(deinit) = &routine.deinit {
            run_guarded(log, || deinit(pool));
        }
        state.store(WorkerState::Closed as u8, Ordering::Release);
    }

    /// Thread name.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Asks the thread to leave its main loop after the current iteration.
    pub(crate) fn signal_close(&self) {
        self.close.store(true, Ordering::Release);
    }

    /// Waits for the thread to finish.
    pub(crate) fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(worker = %self.name, "worker thread terminated by an uncaught panic");
            }
        }
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker").field("name", &self.name).field("state", &self.state()).finish()
    }
}
