//! # Deadlock Termination Timer
//!
//! Watchdog for concurrency tests: a test that hangs would block the whole
//! test run, so the process is aborted once the time limit passes.
//!
//! ```rust,ignore
//! let _timer = DeadlockTerminationTimer::new(Duration::from_secs(5))?;
//! pool.close_all_threads(); // aborts the process if this never returns
//! ```

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{ThreadPoolError, ThreadPoolResult};

/// Limit used by [`DeadlockTerminationTimer::with_default_limit`].
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(30);

/// Aborts the process unless dropped within its time limit.
#[derive(Debug)]
pub struct DeadlockTerminationTimer {
    cancel: Option<Sender<()>>,
    watchdog: Option<JoinHandle<()>>,
}

impl DeadlockTerminationTimer {
    /// Starts the watchdog.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadPoolError::Spawn`] if the watchdog thread cannot be
    /// started.
    pub fn new(limit: Duration) -> ThreadPoolResult<Self> {
        let (cancel, cancelled) = bounded::<()>(1);
        let watchdog = thread::Builder::new()
            .name("gdl-deadlock-timer".into())
            .spawn(move || {
                // Disconnection is the cancel signal
                if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(limit) {
                    tracing::error!(?limit, "deadlock termination timer expired");
                    eprintln!("deadlock termination timer expired after {limit:?}, aborting");
                    std::process::abort();
                }
            })
            .map_err(|e| ThreadPoolError::Spawn(e.to_string()))?;

        Ok(Self { cancel: Some(cancel), watchdog: Some(watchdog) })
    }

    /// Starts the watchdog with [`DEFAULT_TIME_LIMIT`].
    ///
    /// # Errors
    ///
    /// See [`DeadlockTerminationTimer::new`].
    pub fn with_default_limit() -> ThreadPoolResult<Self> {
        Self::new(DEFAULT_TIME_LIMIT)
    }
}

impl Drop for DeadlockTerminationTimer {
    fn drop(&mut self) {
        drop(self.cancel.take());
        if let Some(watchdog) = self.watchdog.take() {
            let _ = watchdog.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_drop_cancels_promptly() {
        let start = Instant::now();
        {
            let _timer = DeadlockTerminationTimer::new(Duration::from_secs(60)).unwrap();
            thread::sleep(Duration::from_millis(5));
        }
        assert!(start.elapsed() < Duration::from_secs(10));
    }
}
