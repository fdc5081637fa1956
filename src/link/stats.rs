//! Traffic statistics for the link bridge
//!
//! Thread-safe counters for throughput and lossy events.
//! Uses lock-free atomics for all operations.

use crate::constants::RATE_UPDATE_MIN_INTERVAL_SECS;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub dropped_bytes: u64,
    pub lines_in: u64,
    pub lines_out: u64,
    pub overflows: u64,
    pub partial_writes: u64,
}

/// Link statistics with rate calculation (fully lock-free)
pub struct LinkStats {
    /// Bytes accepted into the uplink
    rx_total: AtomicU64,
    /// Bytes handed to the transport from the downlink
    tx_total: AtomicU64,
    /// Ingress bytes discarded because the uplink was full
    dropped: AtomicU64,
    /// Complete lines delivered to the consumer
    lines_in: AtomicU64,
    /// Terminators written by the consumer
    lines_out: AtomicU64,
    /// Lines that did not fit the consumer's buffer
    overflows: AtomicU64,
    /// Writes cut short by downlink backpressure
    partial_writes: AtomicU64,
    /// Snapshot of tx_total at last rate calculation
    tx_snapshot: AtomicU64,
    /// Snapshot of rx_total at last rate calculation
    rx_snapshot: AtomicU64,
    /// Reference instant for time calculations
    start_time: Instant,
    /// Nanoseconds since start_time at last rate calculation
    last_calc_nanos: AtomicU64,
    /// Cached TX rate in bytes/sec (stored as f64 bits)
    tx_rate: AtomicU64,
    /// Cached RX rate in bytes/sec (stored as f64 bits)
    rx_rate: AtomicU64,
}

impl LinkStats {
    pub fn new() -> Self {
        Self {
            rx_total: AtomicU64::new(0),
            tx_total: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            lines_in: AtomicU64::new(0),
            lines_out: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
            partial_writes: AtomicU64::new(0),
            tx_snapshot: AtomicU64::new(0),
            rx_snapshot: AtomicU64::new(0),
            start_time: Instant::now(),
            last_calc_nanos: AtomicU64::new(0),
            tx_rate: AtomicU64::new(0),
            rx_rate: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn add_rx(&self, bytes: usize) {
        self.rx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Take back bytes counted by `add_rx` that were later dropped
    pub fn sub_rx(&self, bytes: usize) {
        let _ = self
            .rx_total
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |total| {
                Some(total.saturating_sub(bytes as u64))
            });
    }

    #[inline]
    pub fn add_tx(&self, bytes: usize) {
        self.tx_total.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_dropped(&self, bytes: usize) {
        self.dropped.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_line_in(&self) {
        self.lines_in.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_lines_out(&self, lines: usize) {
        self.lines_out.fetch_add(lines as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_partial_write(&self) {
        self.partial_writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            rx_bytes: self.rx_total.load(Ordering::Relaxed),
            tx_bytes: self.tx_total.load(Ordering::Relaxed),
            dropped_bytes: self.dropped.load(Ordering::Relaxed),
            lines_in: self.lines_in.load(Ordering::Relaxed),
            lines_out: self.lines_out.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            partial_writes: self.partial_writes.load(Ordering::Relaxed),
        }
    }

    /// Update rate calculations and return (tx_kb_s, rx_kb_s)
    pub fn update_rates(&self) -> (f64, f64) {
        let now_nanos = self.start_time.elapsed().as_nanos() as u64;
        let last_nanos = self.last_calc_nanos.load(Ordering::Relaxed);
        let elapsed = now_nanos.saturating_sub(last_nanos) as f64 / 1_000_000_000.0;

        if elapsed < RATE_UPDATE_MIN_INTERVAL_SECS {
            return self.cached_rates();
        }

        // Claim the update so concurrent callers don't double-count
        if self
            .last_calc_nanos
            .compare_exchange(last_nanos, now_nanos, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return self.cached_rates();
        }

        let tx_now = self.tx_total.load(Ordering::Relaxed);
        let rx_now = self.rx_total.load(Ordering::Relaxed);
        let tx_prev = self.tx_snapshot.swap(tx_now, Ordering::Relaxed);
        let rx_prev = self.rx_snapshot.swap(rx_now, Ordering::Relaxed);

        let tx_rate = (tx_now - tx_prev) as f64 / elapsed / 1024.0; // KB/s
        let rx_rate = (rx_now - rx_prev) as f64 / elapsed / 1024.0; // KB/s

        self.tx_rate.store(tx_rate.to_bits(), Ordering::Relaxed);
        self.rx_rate.store(rx_rate.to_bits(), Ordering::Relaxed);

        (tx_rate, rx_rate)
    }

    fn cached_rates(&self) -> (f64, f64) {
        let tx = f64::from_bits(self.tx_rate.load(Ordering::Relaxed));
        let rx = f64::from_bits(self.rx_rate.load(Ordering::Relaxed));
        (tx, rx)
    }
}

impl Default for LinkStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = LinkStats::new();
        stats.add_rx(10);
        stats.add_rx(5);
        stats.add_tx(3);
        stats.add_dropped(7);
        stats.add_line_in();
        stats.add_lines_out(2);
        stats.add_overflow();
        stats.add_partial_write();

        let snap = stats.snapshot();
        assert_eq!(snap.rx_bytes, 15);
        assert_eq!(snap.tx_bytes, 3);
        assert_eq!(snap.dropped_bytes, 7);
        assert_eq!(snap.lines_in, 1);
        assert_eq!(snap.lines_out, 2);
        assert_eq!(snap.overflows, 1);
        assert_eq!(snap.partial_writes, 1);
    }

    #[test]
    fn test_sub_rx_saturates() {
        let stats = LinkStats::new();
        stats.add_rx(4);
        stats.sub_rx(3);
        assert_eq!(stats.snapshot().rx_bytes, 1);
        stats.sub_rx(5);
        assert_eq!(stats.snapshot().rx_bytes, 0);
    }

    #[test]
    fn test_rates_start_at_zero() {
        let stats = LinkStats::new();
        let (tx, rx) = stats.update_rates();
        assert_eq!(tx, 0.0);
        assert_eq!(rx, 0.0);
    }
}
