//! Link bridge
//!
//! Sits between an asynchronous, chunked transport and a blocking line
//! consumer:
//!
//! ```text
//! transport ──chunk-in──► uplink ──boundaries──► read_line ──► shell
//! transport ◄─chunk-out── downlink ◄──────────── write_line ◄── shell
//! ```
//!
//! `LinkBridge` is the single context object owning both channels, the
//! boundary FIFO and the counters. The transport side only ever sees the
//! `TransportAdapter` registered by `init()`.

pub mod adapter;
pub mod boundary;
pub mod channel;
pub mod console;
mod framer;
pub mod stats;

pub use adapter::TransportAdapter;
pub use channel::{ByteChannel, Wait};
pub use console::Console;
pub use stats::{LinkStats, StatsSnapshot};

use self::boundary::BoundaryQueue;
use crate::config::{BridgeConfig, UplinkMode};
use crate::transport::LinkTransport;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Runtime settings derived from `BridgeConfig`
#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub capacity: usize,
    pub byte_timeout: Duration,
    pub ingress_timeout: Duration,
    pub uplink_mode: UplinkMode,
    pub trace_traffic: bool,
}

impl From<&BridgeConfig> for LinkSettings {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            capacity: config.channel_capacity,
            byte_timeout: config.byte_timeout(),
            ingress_timeout: config.ingress_timeout(),
            uplink_mode: config.uplink_mode,
            trace_traffic: config.trace_traffic,
        }
    }
}

/// Line assembly state, owned by the chunk-in path
#[derive(Debug, Default)]
pub(crate) struct IngressState {
    /// Bytes of the unterminated line at the back of the uplink
    pub(crate) partial: usize,
    /// Dropping bytes until the next terminator
    pub(crate) discarding: bool,
}

/// State reachable from both the consumer and the transport callbacks
pub(crate) struct Shared {
    pub(crate) uplink: ByteChannel,
    pub(crate) downlink: ByteChannel,
    pub(crate) boundaries: BoundaryQueue,
    pub(crate) ingress: Mutex<IngressState>,
    /// Held while a line is drained so a flush cannot interleave
    pub(crate) reader: Mutex<()>,
    pub(crate) stats: LinkStats,
    pub(crate) settings: LinkSettings,
}

/// Unread remainder of the last line handed out byte by byte
#[derive(Debug, Default)]
struct LineCursor {
    line: Vec<u8>,
    pos: usize,
}

impl LineCursor {
    fn next(&mut self) -> Option<u8> {
        let byte = self.line.get(self.pos).copied()?;
        self.pos += 1;
        Some(byte)
    }

    fn refill(&mut self, line: Vec<u8>) {
        self.line = line;
        self.pos = 0;
    }

    fn clear(&mut self) {
        self.line.clear();
        self.pos = 0;
    }
}

/// Console bridge context
///
/// Construct once per process and share it by `Arc` between the session
/// controller and the consumer.
pub struct LinkBridge {
    shared: Arc<Shared>,
    transport: Arc<dyn LinkTransport>,
    initialized: AtomicBool,
    cursor: Mutex<LineCursor>,
}

impl LinkBridge {
    /// Create both channels and the boundary FIFO
    ///
    /// Nothing is registered with the transport until `init()`.
    pub fn new(config: &BridgeConfig, transport: Arc<dyn LinkTransport>) -> Self {
        let settings = LinkSettings::from(config);
        let shared = Shared {
            uplink: ByteChannel::new("uplink", settings.capacity),
            downlink: ByteChannel::new("downlink", settings.capacity),
            boundaries: BoundaryQueue::new(settings.capacity),
            ingress: Mutex::new(IngressState::default()),
            reader: Mutex::new(()),
            stats: LinkStats::new(),
            settings,
        };
        Self {
            shared: Arc::new(shared),
            transport,
            initialized: AtomicBool::new(false),
            cursor: Mutex::new(LineCursor::default()),
        }
    }

    /// Register the bridge's callbacks with the transport
    ///
    /// Only the first call has an effect; returns whether this call did the
    /// registration.
    pub fn init(&self) -> bool {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("link bridge already initialized");
            return false;
        }

        let adapter = TransportAdapter::new(self.shared.clone());
        self.transport.register(Arc::new(adapter));
        info!(
            capacity = self.shared.settings.capacity,
            mode = ?self.shared.settings.uplink_mode,
            "link bridge initialized"
        );
        true
    }

    /// Connection state as reported by the transport
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.shared.settings
    }

    pub fn stats(&self) -> &LinkStats {
        &self.shared.stats
    }

    /// Bytes waiting to be sent
    pub fn pending_send_len(&self) -> usize {
        self.shared.downlink.depth()
    }

    /// Bytes received but not yet read
    pub fn pending_receive_len(&self) -> usize {
        self.shared.uplink.depth()
    }

    /// Complete lines ready for `read_line`
    pub fn pending_lines(&self) -> usize {
        self.shared.boundaries.pending()
    }

    /// Tell the transport the downlink holds data
    pub fn wake_transport(&self) {
        self.transport.notify_data_available();
    }

    /// Discard everything queued in both directions
    ///
    /// Returns `(uplink_bytes, downlink_bytes)` discarded. A reader that took
    /// a boundary before the flush gets `LineError::Empty`.
    pub fn flush(&self) -> (usize, usize) {
        let shared = &*self.shared;
        let _reader = shared.reader.lock();
        let mut ingress = shared.ingress.lock();

        shared.boundaries.reset();
        let uplink = shared.uplink.clear();
        *ingress = IngressState::default();
        drop(ingress);

        let downlink = shared.downlink.clear();
        self.cursor.lock().clear();

        if uplink > 0 || downlink > 0 {
            debug!(uplink, downlink, "flushed link channels");
        }
        (uplink, downlink)
    }

    /// Blocking `io::Read`/`io::Write` view for a consumer owning `stop`
    pub fn console<'a>(&'a self, stop: &'a AtomicBool) -> Console<'a> {
        Console::new(self, stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryLink;

    fn bridge() -> (Arc<MemoryLink>, LinkBridge) {
        let link = Arc::new(MemoryLink::new());
        let bridge = LinkBridge::new(&BridgeConfig::default(), link.clone());
        (link, bridge)
    }

    #[test]
    fn test_init_is_idempotent() {
        let (link, bridge) = bridge();
        assert_eq!(link.registrations(), 0);
        assert!(bridge.init());
        assert!(!bridge.init());
        assert_eq!(link.registrations(), 1);
    }

    #[test]
    fn test_flush_empties_both_directions() {
        let (link, bridge) = bridge();
        bridge.init();
        link.deliver(b"one\npartial");
        bridge.write_line(b"out\n");

        assert_eq!(bridge.flush(), (11, 4));
        assert_eq!(bridge.pending_receive_len(), 0);
        assert_eq!(bridge.pending_send_len(), 0);
        assert_eq!(bridge.pending_lines(), 0);

        // The discarded partial line must not prefix the next one
        link.deliver(b"fresh\n");
        let mut buf = [0u8; 32];
        let n = bridge.read_line(&mut buf, &AtomicBool::new(false)).unwrap();
        assert_eq!(&buf[..n], b"fresh\n");
    }

    #[test]
    fn test_settings_follow_config() {
        let config = BridgeConfig {
            channel_capacity: 300,
            uplink_mode: UplinkMode::Raw,
            ..BridgeConfig::default()
        };
        let bridge = LinkBridge::new(&config, Arc::new(MemoryLink::new()));
        assert_eq!(bridge.settings().capacity, 300);
        assert_eq!(bridge.settings().uplink_mode, UplinkMode::Raw);
    }
}
