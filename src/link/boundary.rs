//! Line boundary FIFO
//!
//! Every terminator accepted on the uplink releases one boundary carrying the
//! full length of the line it closes. `read_line` takes exactly one boundary
//! per line, so back-to-back chunks never overwrite a pending boundary.

use super::channel::Wait;
use crate::constants::STOP_CHECK_INTERVAL_MS;
use crate::error::LineError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::error;

/// A released line boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    /// Flush generation the boundary was released in
    pub epoch: u64,
    /// Length of the line including its terminator
    pub len: usize,
}

struct Pending {
    lens: VecDeque<usize>,
    epoch: u64,
}

/// Counting signal that queues line lengths instead of a bare count
pub struct BoundaryQueue {
    pending: Mutex<Pending>,
    ready: Condvar,
    /// Largest line the uplink can hold
    limit: usize,
}

impl BoundaryQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            pending: Mutex::new(Pending {
                lens: VecDeque::new(),
                epoch: 0,
            }),
            ready: Condvar::new(),
            limit,
        }
    }

    /// Release one boundary of `len` bytes
    ///
    /// # Panics
    ///
    /// A length of zero or above the uplink capacity means the framing state
    /// is corrupt; continuing would misdeliver every following line.
    pub fn release(&self, len: usize) {
        if len == 0 || len > self.limit {
            error!(len, limit = self.limit, "line boundary out of range");
            panic!(
                "line boundary of {} bytes outside 1..={}",
                len, self.limit
            );
        }
        self.pending.lock().lens.push_back(len);
        self.ready.notify_one();
    }

    /// Take the oldest boundary, waiting up to `wait`
    ///
    /// Waits wake at least every `STOP_CHECK_INTERVAL_MS` to observe `stop`.
    pub fn take(&self, wait: Wait, stop: &AtomicBool) -> Result<Boundary, LineError> {
        let deadline = wait.deadline();
        let check = Duration::from_millis(STOP_CHECK_INTERVAL_MS);
        let mut pending = self.pending.lock();

        loop {
            if let Some(len) = pending.lens.pop_front() {
                return Ok(Boundary {
                    epoch: pending.epoch,
                    len,
                });
            }
            if stop.load(Ordering::Relaxed) {
                return Err(LineError::Cancelled);
            }

            let now = Instant::now();
            let wake = match deadline {
                None => return Err(LineError::TimedOut),
                Some(None) => now + check,
                Some(Some(deadline)) if now >= deadline => return Err(LineError::TimedOut),
                Some(Some(deadline)) => deadline.min(now + check),
            };
            self.ready.wait_until(&mut pending, wake);
        }
    }

    /// Number of released boundaries not yet taken
    pub fn pending(&self) -> usize {
        self.pending.lock().lens.len()
    }

    /// Current flush generation
    pub fn epoch(&self) -> u64 {
        self.pending.lock().epoch
    }

    /// Forget all pending boundaries and start a new generation
    ///
    /// Boundaries taken before the reset carry the old epoch and must be
    /// treated as stale by the reader.
    pub fn reset(&self) -> usize {
        let mut pending = self.pending.lock();
        let discarded = pending.lens.len();
        pending.lens.clear();
        pending.epoch = pending.epoch.wrapping_add(1);
        discarded
    }
}
