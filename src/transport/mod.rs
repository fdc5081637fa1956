//! Transport abstraction for the wireless link
//!
//! Separates the link stack from the console bridge:
//! - **Transport**: how chunks reach the device and leave it (BLE, UDP, UART...)
//! - **Bridge**: queueing and line framing (see `crate::link`)
//!
//! The interface is two-sided. The bridge hands the transport a `LinkSink`
//! once at registration; the transport calls into it from its own execution
//! context. The bridge in turn holds the transport to query the connection
//! state and to wake an idle send path.
//!
//! # Adding a new transport
//!
//! 1. Create `transport/my_link.rs`
//! 2. Implement the `LinkTransport` trait
//! 3. Add `pub mod my_link;` here

pub mod memory;
pub mod serial;
pub mod udp;

pub use memory::MemoryLink;
pub use serial::SerialLink;
pub use udp::UdpLink;

use std::sync::Arc;
use std::time::Duration;

/// Callbacks the transport invokes on the bridge
///
/// Every method may be called concurrently with the consumer and must return
/// within a short bound: a callback that blocks stalls the link stack.
pub trait LinkSink: Send + Sync {
    /// A chunk arrived from the peer
    ///
    /// Returns how many bytes were accepted. Anything less than `chunk.len()`
    /// is a short write; retrying or dropping is the transport's choice.
    /// Bytes of an unterminated line accepted by earlier calls may still be
    /// dropped if the line later cannot fit, and are then moved from the
    /// received count to the dropped count. May block for up to the bridge's
    /// ingress timeout.
    fn on_chunk_received(&self, chunk: &[u8]) -> usize;

    /// The link can carry up to `out.len()` bytes
    ///
    /// Fills `out` from the downlink, waiting at most `deadline` per byte.
    /// Stops after the first terminator so packets tend to end on line
    /// boundaries. Returns the number of bytes filled.
    fn on_send_requested(&self, out: &mut [u8], deadline: Duration) -> usize;

    /// Bytes waiting in the downlink
    fn pending_send_len(&self) -> usize;
}

/// Capabilities the bridge consumes from the link stack
///
/// # Lifecycle
///
/// 1. Create and start the transport
/// 2. The bridge calls `register()` exactly once from `LinkBridge::init()`
/// 3. The transport delivers chunks and pulls sends through the sink
/// 4. The session controller polls `is_connected()`
pub trait LinkTransport: Send + Sync {
    /// Install the bridge's callbacks (chunk-in, chunk-out, send-ready query)
    fn register(&self, sink: Arc<dyn LinkSink>);

    /// Whether a peer is currently connected
    fn is_connected(&self) -> bool;

    /// New downlink data exists; wake the send path if idle
    fn notify_data_available(&self);
}
