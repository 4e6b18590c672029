//! # Thread Pool Queue
//!
//! Mutex-protected FIFO with a validity flag. Once invalidated, the queue
//! rejects pushes and every pop fails, so pollers observe shutdown without
//! waiting on a condition.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// Thread-safe FIFO queue.
#[derive(Debug)]
pub struct ThreadPoolQueue<T> {
    items: Mutex<VecDeque<T>>,
    valid: AtomicBool,
}

impl<T> Default for ThreadPoolQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ThreadPoolQueue<T> {
    /// Creates an empty, valid queue.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Mutex::new(VecDeque::new()), valid: AtomicBool::new(true) }
    }

    /// Appends `value`. Hands it back if the queue was invalidated.
    pub fn push(&self, value: T) -> Result<(), T> {
        let mut items = self.items.lock();
        if !self.is_valid() {
            return Err(value);
        }
        items.push_back(value);
        Ok(())
    }

    /// Pops the oldest value, if any and the queue is still valid.
    pub fn try_pop(&self) -> Option<T> {
        if !self.is_valid() {
            return None;
        }
        self.items.lock().pop_front()
    }

    /// Number of queued values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Drops every queued value.
    pub fn clear(&self) {
        // Values are dropped outside the lock; their destructors may touch the pool
        let drained = std::mem::take(&mut *self.items.lock());
        drop(drained);
    }

    /// Makes all subsequent pushes and pops fail.
    pub fn invalidate(&self) {
        let _items = self.items.lock();
        self.valid.store(false, Ordering::Release);
    }

    /// Whether the queue still accepts and hands out values.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = ThreadPoolQueue::new();
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.len(), 5);
        let popped: Vec<_> = std::iter::from_fn(|| queue.try_pop()).collect();
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_invalidated_queue_rejects_everything() {
        let queue = ThreadPoolQueue::new();
        queue.push("kept").unwrap();
        queue.invalidate();

        assert!(!queue.is_valid());
        assert_eq!(queue.try_pop(), None);
        assert_eq!(queue.push("late"), Err("late"));
        assert_eq!(queue.len(), 1);

        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(ThreadPoolQueue::new());
        let producers: Vec<_> = (0..8)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..1000 {
                        queue.push(t * 1000 + i).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut values: Vec<_> = std::iter::from_fn(|| queue.try_pop()).collect();
        values.sort_unstable();
        assert_eq!(values, (0..8000).collect::<Vec<_>>());
    }
}
