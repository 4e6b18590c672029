//! # Tasks
//!
//! A task owns one moved-in callable. The submitter creates it, the queue
//! owns it while pending, and the thread that pops it consumes it on
//! execution.

use std::fmt::{self, Display};

/// Outcome of one task: `Err` carries the formatted failure.
pub type TaskResult = Result<(), String>;

/// Return types a task callable may have.
pub trait TaskOutcome {
    /// Converts the return value into a [`TaskResult`].
    fn into_task_result(self) -> TaskResult;
}

impl TaskOutcome for () {
    #[inline]
    fn into_task_result(self) -> TaskResult {
        Ok(())
    }
}

impl<E: Display> TaskOutcome for Result<(), E> {
    #[inline]
    fn into_task_result(self) -> TaskResult {
        self.map_err(|error| error.to_string())
    }
}

/// Type-erased unit of work.
pub trait TaskBase: Send {
    /// Runs the work, consuming the task.
    fn execute(self: Box<Self>) -> TaskResult;
}

/// Task wrapping a single callable.
pub struct Task<F> {
    function: F,
}

impl<F, R> Task<F>
where
    F: FnOnce() -> R + Send,
    R: TaskOutcome,
{
    /// Wraps `function`.
    #[must_use]
    pub fn new(function: F) -> Self {
        Self { function }
    }
}

impl<F, R> Task<F>
where
    F: FnOnce() -> R + Send + 'static,
    R: TaskOutcome,
{
    /// Wraps `function` into an owned, type-erased task.
    #[must_use]
    pub fn boxed(function: F) -> Box<dyn TaskBase> {
        Box::new(Self::new(function))
    }
}

impl<F, R> TaskBase for Task<F>
where
    F: FnOnce() -> R + Send,
    R: TaskOutcome,
{
    fn execute(self: Box<Self>) -> TaskResult {
        (self.function)().into_task_result()
    }
}

impl<F> fmt::Debug for Task<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("function", &std::any::type_name::<F>()).finish()
    }
}
