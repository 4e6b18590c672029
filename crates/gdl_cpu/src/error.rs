//! # Thread Pool Error Types

use thiserror::Error;

/// Errors that can occur while driving a thread pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThreadPoolError {
    /// Queue index outside the pool's queues.
    #[error("invalid queue index {index}: the pool has {count} queue(s)")]
    InvalidQueue {
        /// Requested index.
        index: usize,
        /// Number of queues.
        count: usize,
    },

    /// The queue was invalidated by the pool's shutdown.
    #[error("queue {index} no longer accepts tasks")]
    QueueInvalidated {
        /// Index of the queue.
        index: usize,
    },

    /// The operating system refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(String),

    /// Worker threads reported exceptions; carries the whole log.
    #[error("worker threads reported exceptions:\n{0}")]
    WorkerExceptions(String),
}

/// Result type for thread pool operations.
pub type ThreadPoolResult<T> = Result<T, ThreadPoolError>;
