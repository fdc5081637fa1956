//! Fixed-capacity blocking byte queue
//!
//! One instance carries received bytes toward the consumer (uplink), another
//! carries bytes written by the consumer toward the transport (downlink).
//! Both sides may block with a bounded or unbounded wait.

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long a push or pop may wait for the queue to become ready
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Do not wait: report full/empty immediately
    Poll,
    /// Wait at most this long
    For(Duration),
    /// Wait until an absolute instant
    Until(Instant),
    /// Wait until the queue is ready
    Forever,
}

impl Wait {
    /// `None` for `Poll`, `Some(None)` for `Forever`
    pub(crate) fn deadline(self) -> Option<Option<Instant>> {
        match self {
            Wait::Poll => None,
            Wait::For(timeout) => Some(Some(Instant::now() + timeout)),
            Wait::Until(deadline) => Some(Some(deadline)),
            Wait::Forever => Some(None),
        }
    }
}

/// Ordered byte queue with a capacity fixed at construction
///
/// Producers block (up to their `Wait`) while the queue is full, consumers
/// block while it is empty. The length never exceeds the capacity.
pub struct ByteChannel {
    name: &'static str,
    capacity: usize,
    queue: Mutex<VecDeque<u8>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl ByteChannel {
    /// Create a channel holding at most `capacity` bytes
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Channel name used in log output
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes currently queued
    pub fn depth(&self) -> usize {
        self.queue.lock().len()
    }

    /// Enqueue one byte. Returns `false` if the queue stayed full for `wait`.
    pub fn push(&self, byte: u8, wait: Wait) -> bool {
        let capacity = self.capacity;
        let mut queue = self.queue.lock();
        if !wait_for(&self.not_full, &mut queue, wait, |q| q.len() < capacity) {
            return false;
        }
        queue.push_back(byte);
        drop(queue);
        self.not_empty.notify_one();
        true
    }

    /// Dequeue one byte. Returns `None` if the queue stayed empty for `wait`.
    pub fn pop(&self, wait: Wait) -> Option<u8> {
        let mut queue = self.queue.lock();
        if !wait_for(&self.not_empty, &mut queue, wait, |q| !q.is_empty()) {
            return None;
        }
        let byte = queue.pop_front();
        drop(queue);
        self.not_full.notify_one();
        byte
    }

    /// Remove the `count` most recently pushed bytes
    ///
    /// Only valid for a caller that is the sole producer and knows those bytes
    /// have not been consumed. Returns the number actually removed.
    pub fn truncate_back(&self, count: usize) -> usize {
        let mut queue = self.queue.lock();
        let removed = count.min(queue.len());
        let keep = queue.len() - removed;
        queue.truncate(keep);
        drop(queue);
        if removed > 0 {
            self.not_full.notify_all();
        }
        removed
    }

    /// Drop every queued byte, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut queue = self.queue.lock();
        let discarded = queue.len();
        queue.clear();
        drop(queue);
        if discarded > 0 {
            self.not_full.notify_all();
        }
        discarded
    }
}

/// Block on `cv` until `ready` holds or `wait` expires
///
/// Returns whether `ready` holds on exit.
fn wait_for<F>(
    cv: &Condvar,
    guard: &mut MutexGuard<'_, VecDeque<u8>>,
    wait: Wait,
    ready: F,
) -> bool
where
    F: Fn(&VecDeque<u8>) -> bool,
{
    if ready(&**guard) {
        return true;
    }
    let Some(deadline) = wait.deadline() else {
        return false;
    };
    loop {
        match deadline {
            None => cv.wait(guard),
            Some(deadline) => {
                if cv.wait_until(guard, deadline).timed_out() {
                    return ready(&**guard);
                }
            }
        }
        if ready(&**guard) {
            return true;
        }
    }
}
