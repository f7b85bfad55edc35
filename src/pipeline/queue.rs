// src/pipeline/queue.rs

//! FIFO hand-off between the page producer and the worker pool.
//!
//! The queue tracks two things: the items waiting to be taken, and the items
//! that were put but not yet marked done. `join` waits on the second count,
//! so it only returns once every item has been fully processed.
//!
//! Shutdown protocol:
//!
//! 1. `close()` rejects further `put`s.
//! 2. Workers keep calling `get()` and receive the remaining items.
//! 3. `get()` returns `None` once the queue is closed and empty.

use std::collections::VecDeque;
use std::fmt;
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Returned by [`WorkQueue::put`] after [`WorkQueue::close`], carrying the
/// rejected item back to the caller.
pub struct QueueClosed<T>(pub T);

impl<T> fmt::Debug for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueClosed(..)")
    }
}

impl<T> fmt::Display for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("work queue is closed")
    }
}

impl<T> std::error::Error for QueueClosed<T> {}

struct State<T> {
    items: VecDeque<T>,
    /// Put but not yet marked done
    unfinished: usize,
    closed: bool,
}

/// Multi-consumer FIFO with done-tracking.
pub struct WorkQueue<T> {
    state: Mutex<State<T>>,
    /// `None` for unbounded
    capacity: Option<usize>,
    item_added: Notify,
    slot_freed: Notify,
    all_done: Notify,
}

impl<T> WorkQueue<T> {
    /// Create a queue holding at most `capacity` waiting items.
    ///
    /// A capacity of 0 means unbounded: `put` never waits.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                unfinished: 0,
                closed: false,
            }),
            capacity: (capacity > 0).then_some(capacity),
            item_added: Notify::new(),
            slot_freed: Notify::new(),
            all_done: Notify::new(),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item, waiting for space when the queue is full.
    pub async fn put(&self, item: T) -> Result<(), QueueClosed<T>> {
        loop {
            let mut freed = pin!(self.slot_freed.notified());
            freed.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(QueueClosed(item));
                }
                if self.capacity.is_none_or(|cap| state.items.len() < cap) {
                    state.items.push_back(item);
                    state.unfinished += 1;
                    drop(state);
                    self.item_added.notify_one();
                    return Ok(());
                }
            }

            freed.await;
        }
    }

    /// Take the oldest item, waiting until one arrives.
    ///
    /// Returns `None` only when the queue is closed and fully drained.
    pub async fn get(&self) -> Option<T> {
        loop {
            let mut added = pin!(self.item_added.notified());
            added.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.slot_freed.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            added.await;
        }
    }

    /// Record that one item taken with `get` has been fully handled.
    pub fn mark_done(&self) {
        let mut state = self.lock();
        if state.unfinished == 0 {
            log::warn!("mark_done called more times than items were put");
            return;
        }
        state.unfinished -= 1;
        if state.unfinished == 0 {
            drop(state);
            self.all_done.notify_waiters();
        }
    }

    /// Wait until every item put so far has been marked done.
    pub async fn join(&self) {
        loop {
            let mut done = pin!(self.all_done.notified());
            done.as_mut().enable();

            let idle = self.lock().unfinished == 0;
            if idle {
                return;
            }

            done.await;
        }
    }

    /// Stop accepting items and wake every waiting producer and consumer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.item_added.notify_waiters();
        self.slot_freed.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Items waiting to be taken.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items put but not yet marked done.
    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }
}

/// Calls [`WorkQueue::mark_done`] when dropped, so every exit path from a
/// worker iteration acknowledges its item.
pub struct DoneGuard<'a, T> {
    queue: &'a WorkQueue<T>,
}

impl<'a, T> DoneGuard<'a, T> {
    pub fn new(queue: &'a WorkQueue<T>) -> Self {
        Self { queue }
    }
}

impl<T> Drop for DoneGuard<'_, T> {
    fn drop(&mut self) {
        self.queue.mark_done();
    }
}
