//! # Exception Log
//!
//! Failures inside worker threads never cross the thread boundary. Task
//! errors and panics are caught by [`run_guarded`] and appended here; callers
//! see them only when they inspect or propagate the log.

use parking_lot::Mutex;
use std::any::Any;
use std::fmt::Write;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crate::task::TaskResult;

/// Header of entries with a known message.
pub const CAUGHT_EXCEPTION: &str = "caught exception";
/// Header of entries whose panic payload carried no message.
pub const CAUGHT_UNKNOWN_EXCEPTION: &str = "caught UNKNOWN exception";

/// Accumulated, formatted failure text of all workers.
#[derive(Debug, Default)]
pub struct ExceptionLog {
    text: Mutex<String>,
}

impl ExceptionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry naming the current thread.
    pub fn record(&self, header: &str, message: &str) {
        let current = thread::current();
        let thread_name = current.name().unwrap_or("<unnamed>");
        tracing::warn!(thread = thread_name, %message, "{header}");

        let mut text = self.text.lock();
        // Writing into a String cannot fail
        let _ = writeln!(text, "[{thread_name} {:?}] {header}: {message}", current.id());
    }

    /// Length of the log text in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.text.lock().len()
    }

    /// Whether nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.lock().is_empty()
    }

    /// Copy of the log text.
    #[must_use]
    pub fn contents(&self) -> String {
        self.text.lock().clone()
    }

    /// Removes and returns the log text.
    pub fn take(&self) -> String {
        std::mem::take(&mut *self.text.lock())
    }

    /// Empties the log.
    pub fn clear(&self) {
        self.text.lock().clear();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

/// Runs `function`, logging a returned error or a panic instead of letting it
/// escape. Returns whether `function` completed successfully.
pub fn run_guarded<F>(log: &ExceptionLog, function: F) -> bool
where
    F: FnOnce() -> TaskResult,
{
    match panic::catch_unwind(AssertUnwindSafe(function)) {
        Ok(Ok(())) => true,
        Ok(Err(message)) => {
            log.record(CAUGHT_EXCEPTION, &message);
            false
        }
        Err(payload) => {
            match panic_message(payload.as_ref()) {
                Some(message) => log.record(CAUGHT_EXCEPTION, message),
                None => log.record(CAUGHT_UNKNOWN_EXCEPTION, "panic payload is not a message"),
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_leaves_log_empty() {
        let log = ExceptionLog::new();
        assert!(run_guarded(&log, || Ok(())));
        assert!(log.is_empty());
        assert_eq!(log.size(), 0);
    }

    #[test]
    fn test_error_value_is_logged() {
        let log = ExceptionLog::new();
        assert!(!run_guarded(&log, || Err("bad input".to_string())));
        let text = log.contents();
        assert!(text.contains(CAUGHT_EXCEPTION));
        assert!(text.contains("bad input"));
        assert!(!text.contains(CAUGHT_UNKNOWN_EXCEPTION));
    }

    #[test]
    fn test_panics_are_caught() {
        let log = ExceptionLog::new();
        assert!(!run_guarded(&log, || panic!("formatted {}", 42)));
        assert!(!run_guarded(&log, || panic!("static message")));
        assert!(!run_guarded(&log, || std::panic::panic_any(17_u32)));

        let text = log.take();
        assert!(text.contains("formatted 42"));
        assert!(text.contains("static message"));
        assert_eq!(text.matches(CAUGHT_UNKNOWN_EXCEPTION).count(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_entries_name_the_thread() {
        let log = std::sync::Arc::new(ExceptionLog::new());
        let worker_log = std::sync::Arc::clone(&log);
        thread::Builder::new()
            .name("named-worker".into())
            .spawn(move || run_guarded(&worker_log, || Err("oops".into())))
            .unwrap()
            .join()
            .unwrap();
        assert!(log.contents().contains("named-worker"));
    }
}
