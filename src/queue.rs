//! # Delivery Queue
//!
//! Unbounded FIFO handing records from the sampling loop to the sender
//! thread.
//!
//! Producers never block: `enqueue` takes the lock only long enough to push.
//! Consumers block in `dequeue` on a condition variable until an item is
//! available or the queue has been shut down and drained.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use tracing::error;

struct State<T> {
    items: VecDeque<T>,
    shutdown: bool,
}

/// Thread-safe FIFO with a terminal shutdown state.
pub struct DeliveryQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
}

impl<T> Default for DeliveryQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for DeliveryQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DeliveryQueue")
            .field("len", &state.items.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

impl<T> DeliveryQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                shutdown: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Appends an item and wakes one waiting consumer.
    ///
    /// Never blocks on consumers. Returns `false` if memory for the item could
    /// not be reserved; the item is dropped and the failure logged.
    ///
    /// Enqueueing after [`shutdown`](Self::shutdown) is allowed, but nothing
    /// guarantees the item will still be consumed.
    pub fn enqueue(&self, item: T) -> bool {
        let mut state = self.state.lock();

        if let Err(e) = state.items.try_reserve(1) {
            drop(state);
            error!("Dropping record, queue allocation failed: {}", e);
            return false;
        }

        state.items.push_back(item);
        drop(state);

        self.available.notify_one();
        true
    }

    /// Removes the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue has been shut down and no items remain.
    /// Items enqueued before shutdown are still handed out.
    pub fn dequeue(&self) -> Option<T> {
        let mut state = self.state.lock();

        while state.items.is_empty() && !state.shutdown {
            self.available.wait(&mut state);
        }

        state.items.pop_front()
    }

    /// Removes the oldest item without blocking.
    pub fn try_dequeue(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Signals shutdown and wakes every blocked consumer. Idempotent.
    pub fn shutdown(&self) {
        self.state.lock().shutdown = true;
        self.available.notify_all();
    }

    /// True once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// True if no items are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
