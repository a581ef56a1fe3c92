//! Bounded event buffer between the scheduler and the sink thread.
//!
//! A fixed-capacity FIFO with back-pressure: a full buffer blocks the
//! producer briefly, then evicts the oldest droppable event instead of
//! growing without bound during rapid stop/start cycles. Note releases
//! are evicted last so back-pressure can never leave a note stuck on.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use log::{debug, warn};

use super::sink::SinkEvent;

/// How long a push waits on a full buffer before evicting.
const BACKPRESSURE_WAIT: Duration = Duration::from_millis(50);

struct BufferState {
    queue: VecDeque<SinkEvent>,
    closed: bool,
    dropped: u64,
}

/// Thread-safe bounded FIFO of [`SinkEvent`]s.
pub struct EventBuffer {
    capacity: usize,
    state: Mutex<BufferState>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(BufferState {
                queue: VecDeque::new(),
                closed: false,
                dropped: 0,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    /// Queue an event for the sink thread.
    ///
    /// Blocks up to the back-pressure window when full, then makes room
    /// by dropping the oldest droppable event. Returns `false` when the
    /// event could not be queued (buffer closed, or a droppable event
    /// hit a buffer full of releases).
    pub fn push(&self, event: SinkEvent) -> bool {
        let mut state = self.state.lock().expect("event buffer poisoned");
        if state.queue.len() >= self.capacity && !state.closed {
            let (next, timeout) = self
                .not_full
                .wait_timeout_while(state, BACKPRESSURE_WAIT, |s| {
                    s.queue.len() >= self.capacity && !s.closed
                })
                .expect("event buffer poisoned");
            state = next;
            if timeout.timed_out() && state.queue.len() >= self.capacity {
                // Evict the oldest note_on/program first; releases last
                if let Some(index) = state.queue.iter().position(|e| e.droppable()) {
                    state.queue.remove(index);
                } else if event.droppable() {
                    state.dropped += 1;
                    warn!("event buffer full of releases, skipping {event:?}");
                    return false;
                } else {
                    state.queue.pop_front();
                }
                state.dropped += 1;
                warn!("event buffer full, dropped one event to queue {event:?}");
            }
        }
        if state.closed {
            debug!("event buffer closed, discarding {event:?}");
            return false;
        }
        state.queue.push_back(event);
        self.not_empty.notify_one();
        true
    }

    /// Take the next event, blocking until one arrives or the buffer is
    /// closed and drained.
    pub fn pop(&self) -> Option<SinkEvent> {
        let mut state = self.state.lock().expect("event buffer poisoned");
        while state.queue.is_empty() && !state.closed {
            state = self
                .not_empty
                .wait(state)
                .expect("event buffer poisoned");
        }
        let event = state.queue.pop_front();
        if event.is_some() {
            self.not_full.notify_one();
        }
        event
    }

    /// Close the buffer: producers stop queueing, the consumer drains
    /// what is left and then sees `None`.
    pub fn close(&self) {
        let mut state = self.state.lock().expect("event buffer poisoned");
        state.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("event buffer poisoned").queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events lost to back-pressure so far.
    pub fn dropped(&self) -> u64 {
        self.state.lock().expect("event buffer poisoned").dropped
    }
}
