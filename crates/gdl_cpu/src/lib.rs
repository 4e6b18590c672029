//! # GDL CPU
//!
//! Thread pool with one or more FIFO task queues.
//!
//! ## Architecture Rules
//!
//! 1. **Workers poll** - idle workers sleep briefly and retry, shutdown
//!    invalidates the queues before joining
//! 2. **LIFO close-down** - the most recently started threads close first
//! 3. **Failures stay in the pool** - task errors and panics are logged and
//!    surface only through explicit propagation
//! 4. **Everyone may drain** - any thread can execute queued tasks
//!
//! ## Example
//!
//! ```rust,ignore
//! use gdl_cpu::ThreadPool;
//!
//! let pool: ThreadPool = ThreadPool::new(4)?;
//! for i in 0..100 {
//!     pool.submit(move || do_work(i))?;
//! }
//! while pool.has_tasks() {
//!     pool.try_execute_task();
//! }
//! pool.propagate_exceptions()?;
//! ```

#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod exception_log;
pub mod pool;
pub mod queue;
pub mod spinlock;
pub mod task;
pub mod utility;
pub mod worker;

pub use config::ThreadPoolConfig;
pub use error::{ThreadPoolError, ThreadPoolResult};
pub use exception_log::{ExceptionLog, CAUGHT_EXCEPTION, CAUGHT_UNKNOWN_EXCEPTION};
pub use pool::{PoolHandle, TaskQueue, ThreadPool};
pub use queue::ThreadPoolQueue;
pub use spinlock::{SpinLock, SpinLockGuard};
pub use task::{Task, TaskBase, TaskOutcome, TaskResult};
pub use utility::{DeadlockTerminationTimer, TraceBuffer, TraceEvent};
pub use worker::{WorkerRoutine, WorkerState};
