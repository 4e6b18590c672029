//! # Thread Pool Configuration

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;

/// Startup parameters of a [`crate::ThreadPool`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThreadPoolConfig {
    /// Threads started on construction.
    pub initial_threads: usize,
    /// Sleep of an idle worker before it polls the queues again (µs).
    pub idle_sleep_us: u64,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            initial_threads: std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            idle_sleep_us: 100,
        }
    }
}

impl ThreadPoolConfig {
    /// Default configuration with `initial_threads` threads.
    #[must_use]
    pub fn with_threads(initial_threads: usize) -> Self {
        Self { initial_threads, ..Self::default() }
    }

    /// Idle sleep as a duration.
    #[inline]
    #[must_use]
    pub const fn idle_sleep(&self) -> Duration {
        Duration::from_micros(self.idle_sleep_us)
    }
}
