//! # Trace Buffer
//!
//! Fixed-size ring of timestamped events for debugging concurrent code.
//! Any thread may record; once the ring is full the oldest event is
//! overwritten. Dump the ring after the run to see which thread did what.
//!
//! ```rust,ignore
//! let trace = Arc::new(TraceBuffer::<256>::new());
//! pool.submit({
//!     let trace = Arc::clone(&trace);
//!     move || trace.log_event("task started")
//! })?;
//! trace.dump(&mut std::io::stderr())?;
//! ```

use std::io::{self, Write};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Thread that recorded the event.
    pub thread: ThreadId,
    /// Time since the buffer was created.
    pub timestamp: Duration,
    /// Event description.
    pub message: String,
}

#[derive(Debug)]
struct Ring<const N: usize> {
    events: [Option<TraceEvent>; N],
    next: usize,
}

/// Thread-safe ring of the last `N` events.
#[derive(Debug)]
pub struct TraceBuffer<const N: usize> {
    ring: Mutex<Ring<N>>,
    start: Instant,
}

impl<const N: usize> TraceBuffer<N> {
    const HAS_CAPACITY: () = assert!(N > 0, "trace buffer needs room for at least one event");

    /// Creates an empty buffer; timestamps count from now.
    #[must_use]
    pub fn new() -> Self {
        let () = Self::HAS_CAPACITY;
        Self { ring: Mutex::new(Ring { events: std::array::from_fn(|_| None), next: 0 }), start: Instant::now() }
    }

    /// Number of events the ring holds.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Slot the next event is written to.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.ring.lock().next
    }

    /// Number of recorded events still in the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.lock().events.iter().filter(|event| event.is_some()).count()
    }

    /// Whether no event was recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records `message` for the calling thread, overwriting the oldest
    /// event once the ring is full.
    pub fn log_event(&self, message: impl Into<String>) {
        let event =
            TraceEvent { thread: thread::current().id(), timestamp: self.start.elapsed(), message: message.into() };
        let mut ring = self.ring.lock();
        let slot = ring.next;
        ring.events[slot] = Some(event);
        ring.next = (slot + 1) % N;
    }

    /// Recorded events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        let ring = self.ring.lock();
        let (newer, older) = ring.events.split_at(ring.next);
        older.iter().chain(newer).flatten().cloned().collect()
    }

    /// Writes one line per event, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates errors of `writer`.
    pub fn dump(&self, writer: &mut impl Write) -> io::Result<()> {
        for event in self.events() {
            writeln!(
                writer,
                "[{:>10.3} ms] {:?}: {}",
                event.timestamp.as_secs_f64() * 1000.0,
                event.thread,
                event.message
            )?;
        }
        writer.flush()
    }

    /// Forgets all events.
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.events.iter_mut().for_each(|event| *event = None);
        ring.next = 0;
    }
}

impl<const N: usize> Default for TraceBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
