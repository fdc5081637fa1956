//! In-process transport for tests and loopback runs
//!
//! Nothing moves on its own: the test delivers chunks and pulls sends
//! explicitly, and flips the connection flag by hand.

use super::{LinkSink, LinkTransport};
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Test double for the wireless link
#[derive(Default)]
pub struct MemoryLink {
    sink: RwLock<Option<Arc<dyn LinkSink>>>,
    connected: AtomicBool,
    registrations: AtomicUsize,
    notifications: AtomicUsize,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Deliver a chunk as if it came from the peer
    ///
    /// Returns the count accepted by the bridge, 0 if nothing is registered.
    pub fn deliver(&self, chunk: &[u8]) -> usize {
        match self.sink() {
            Some(sink) => sink.on_chunk_received(chunk),
            None => 0,
        }
    }

    /// Pull one packet of at most `max` bytes from the bridge
    pub fn pull(&self, max: usize, deadline: Duration) -> Bytes {
        let Some(sink) = self.sink() else {
            return Bytes::new();
        };
        let mut buf = BytesMut::zeroed(max);
        let filled = sink.on_send_requested(&mut buf, deadline);
        buf.truncate(filled);
        buf.freeze()
    }

    /// Pull packets of at most `mtu` bytes until the downlink is empty
    pub fn drain(&self, mtu: usize) -> Vec<Bytes> {
        let mut packets = Vec::new();
        while self.pending() > 0 {
            let packet = self.pull(mtu, Duration::ZERO);
            if packet.is_empty() {
                break;
            }
            packets.push(packet);
        }
        packets
    }

    /// Downlink depth as reported by the bridge
    pub fn pending(&self) -> usize {
        self.sink().map(|s| s.pending_send_len()).unwrap_or(0)
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn notifications(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }

    fn sink(&self) -> Option<Arc<dyn LinkSink>> {
        self.sink.read().clone()
    }
}

impl LinkTransport for MemoryLink {
    fn register(&self, sink: Arc<dyn LinkSink>) {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        *self.sink.write() = Some(sink);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn notify_data_available(&self) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_link_is_inert() {
        let link = MemoryLink::new();
        assert_eq!(link.deliver(b"data\n"), 0);
        assert!(link.pull(16, Duration::ZERO).is_empty());
        assert_eq!(link.pending(), 0);
        assert!(!link.is_connected());
    }

    #[test]
    fn test_connection_flag() {
        let link = MemoryLink::new();
        link.set_connected(true);
        assert!(link.is_connected());
        link.set_connected(false);
        assert!(!link.is_connected());
    }
}
