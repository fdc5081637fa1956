//! Transport-facing side of the bridge
//!
//! Implements the callbacks the link stack drives: chunk-in, chunk-out and
//! the pending-send query. Runs in the transport's context, never blocks
//! longer than the configured ingress timeout.

use super::channel::Wait;
use super::Shared;
use crate::config::UplinkMode;
use crate::constants::NEWLINE;
use crate::transport::LinkSink;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, trace, warn};

/// Callbacks registered with the transport by `LinkBridge::init()`
pub struct TransportAdapter {
    shared: Arc<Shared>,
}

impl TransportAdapter {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Push a chunk, releasing one boundary per terminator
    ///
    /// When the uplink stays full, the line in progress is dropped as a whole
    /// (including bytes queued by earlier chunks) and everything up to the
    /// next terminator is discarded, so the consumer never sees a line with a
    /// hole in it and an overlong line cannot wedge the uplink.
    fn ingest_lines(&self, chunk: &[u8], deadline: Instant) -> usize {
        let shared = &*self.shared;
        let mut ingress = shared.ingress.lock();
        let mut accepted = 0;
        let mut dropped = 0;
        // Bytes of the current partial line pushed by this call
        let mut from_chunk = 0;

        for &byte in chunk {
            if ingress.discarding {
                dropped += 1;
                if byte == NEWLINE {
                    ingress.discarding = false;
                }
                continue;
            }

            if shared.uplink.push(byte, Wait::Until(deadline)) {
                accepted += 1;
                if byte == NEWLINE {
                    let len = ingress.partial + 1;
                    ingress.partial = 0;
                    from_chunk = 0;
                    shared.boundaries.release(len);
                } else {
                    ingress.partial += 1;
                    from_chunk += 1;
                }
                continue;
            }

            let partial = ingress.partial;
            let removed = shared.uplink.truncate_back(partial);
            if removed != partial {
                error!(removed, partial, "partial line no longer at uplink tail");
                panic!(
                    "uplink tail desynchronized: removed {} of {} partial bytes",
                    removed, partial
                );
            }
            warn!(
                channel = shared.uplink.name(),
                dropped_line_bytes = partial + 1,
                capacity = shared.uplink.capacity(),
                "channel full, dropping line"
            );
            // Earlier chunks already reported their share as received
            shared.stats.sub_rx(partial - from_chunk);
            accepted -= from_chunk;
            dropped += partial + 1;
            from_chunk = 0;
            ingress.partial = 0;
            ingress.discarding = byte != NEWLINE;
        }

        if dropped > 0 {
            shared.stats.add_dropped(dropped);
        }
        accepted
    }

    /// Push a chunk without line tracking; stops at the first full wait
    fn ingest_raw(&self, chunk: &[u8], deadline: Instant) -> usize {
        let shared = &*self.shared;
        let _ingress = shared.ingress.lock();

        let accepted = chunk
            .iter()
            .take_while(|&&byte| shared.uplink.push(byte, Wait::Until(deadline)))
            .count();

        if accepted < chunk.len() {
            let dropped = chunk.len() - accepted;
            shared.stats.add_dropped(dropped);
            warn!(dropped, "uplink full, dropping chunk tail");
        }
        accepted
    }
}

impl LinkSink for TransportAdapter {
    fn on_chunk_received(&self, chunk: &[u8]) -> usize {
        let shared = &*self.shared;
        if shared.settings.trace_traffic {
            trace!(
                len = chunk.len(),
                data = %String::from_utf8_lossy(chunk).escape_debug(),
                "link rx"
            );
        }

        let deadline = Instant::now() + shared.settings.ingress_timeout;
        let accepted = match shared.settings.uplink_mode {
            UplinkMode::Line => self.ingest_lines(chunk, deadline),
            UplinkMode::Raw => self.ingest_raw(chunk, deadline),
        };
        shared.stats.add_rx(accepted);
        accepted
    }

    fn on_send_requested(&self, out: &mut [u8], deadline: Duration) -> usize {
        let shared = &*self.shared;
        let mut filled = 0;

        while filled < out.len() {
            let Some(byte) = shared.downlink.pop(Wait::For(deadline)) else {
                break;
            };
            out[filled] = byte;
            filled += 1;
            if byte == NEWLINE {
                break;
            }
        }

        if filled > 0 {
            shared.stats.add_tx(filled);
            if shared.settings.trace_traffic {
                trace!(
                    len = filled,
                    data = %String::from_utf8_lossy(&out[..filled]).escape_debug(),
                    "link tx"
                );
            }
        }
        filled
    }

    fn pending_send_len(&self) -> usize {
        self.shared.downlink.depth()
    }
}
