//! Helpers for testing and debugging concurrent code.

pub mod deadlock_timer;
pub mod trace_buffer;

pub use deadlock_timer::{DeadlockTerminationTimer, DEFAULT_TIME_LIMIT};
pub use trace_buffer::{TraceBuffer, TraceEvent};
