//! Consumer-facing line operations
//!
//! Line-buffered uplink, byte-streamed downlink.

use super::boundary::Boundary;
use super::channel::Wait;
use super::LinkBridge;
use crate::config::UplinkMode;
use crate::constants::{NEWLINE, STOP_CHECK_INTERVAL_MS};
use crate::error::LineError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

impl LinkBridge {
    /// Block until a complete line is available and copy it into `buf`
    ///
    /// Returns the line length including the terminator. A line longer than
    /// `buf` is still drained from the uplink; its prefix is copied and
    /// `LineError::Overflow` reports both lengths. Returns
    /// `LineError::Cancelled` once `stop` is raised.
    pub fn read_line(&self, buf: &mut [u8], stop: &AtomicBool) -> Result<usize, LineError> {
        self.read_line_within(buf, Wait::Forever, stop)
    }

    /// `read_line` with a bounded wait for the line to arrive
    pub fn read_line_within(
        &self,
        buf: &mut [u8],
        wait: Wait,
        stop: &AtomicBool,
    ) -> Result<usize, LineError> {
        match self.shared.settings.uplink_mode {
            UplinkMode::Line => {
                let boundary = self.shared.boundaries.take(wait, stop)?;
                self.drain_line(boundary, buf)
            }
            UplinkMode::Raw => self.read_raw(buf, wait, stop),
        }
    }

    fn drain_line(&self, boundary: Boundary, buf: &mut [u8]) -> Result<usize, LineError> {
        let shared = &*self.shared;
        let _reader = shared.reader.lock();

        if boundary.epoch != shared.boundaries.epoch() {
            debug!(len = boundary.len, "boundary released before flush, ignoring");
            return Err(LineError::Empty);
        }

        let mut copied = 0;
        for i in 0..boundary.len {
            let Some(byte) = shared.uplink.pop(Wait::Poll) else {
                error!(got = i, len = boundary.len, "uplink shorter than released line");
                panic!(
                    "uplink holds {} of {} bytes of a released line",
                    i, boundary.len
                );
            };
            if copied < buf.len() {
                buf[copied] = byte;
                copied += 1;
            }
            if i + 1 == boundary.len && byte != NEWLINE {
                error!(len = boundary.len, "released line does not end on a terminator");
                panic!("line boundary of {} bytes misaligned", boundary.len);
            }
        }

        if boundary.len > buf.len() {
            shared.stats.add_overflow();
            warn!(
                line_len = boundary.len,
                max_len = buf.len(),
                "line exceeds read buffer, truncated"
            );
            return Err(LineError::Overflow {
                copied,
                line_len: boundary.len,
            });
        }

        shared.stats.add_line_in();
        Ok(boundary.len)
    }

    /// Blocks for the first byte, then takes whatever is queued up to a
    /// terminator. May deliver a partial line.
    fn read_raw(&self, buf: &mut [u8], wait: Wait, stop: &AtomicBool) -> Result<usize, LineError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let uplink = &self.shared.uplink;
        let first = self.pop_within(wait, stop)?;

        buf[0] = first;
        let mut len = 1;
        let mut terminated = first == NEWLINE;
        while !terminated && len < buf.len() {
            let Some(byte) = uplink.pop(Wait::Poll) else {
                break;
            };
            buf[len] = byte;
            len += 1;
            terminated = byte == NEWLINE;
        }

        if terminated {
            self.shared.stats.add_line_in();
        }
        Ok(len)
    }

    /// Pop one uplink byte, waking periodically to observe `stop`
    fn pop_within(&self, wait: Wait, stop: &AtomicBool) -> Result<u8, LineError> {
        let uplink = &self.shared.uplink;
        let deadline = wait.deadline();
        let check = Duration::from_millis(STOP_CHECK_INTERVAL_MS);

        loop {
            if stop.load(Ordering::Relaxed) {
                return Err(LineError::Cancelled);
            }
            let now = Instant::now();
            let wake = match deadline {
                None => Wait::Poll,
                Some(None) => Wait::Until(now + check),
                Some(Some(deadline)) => Wait::Until(deadline.min(now + check)),
            };
            if let Some(byte) = uplink.pop(wake) {
                return Ok(byte);
            }
            match deadline {
                Some(None) => {}
                Some(Some(deadline)) if Instant::now() < deadline => {}
                _ => return Err(LineError::TimedOut),
            }
        }
    }

    /// Enqueue `data` on the downlink and wake the transport
    ///
    /// Each byte waits at most the configured byte timeout for room. Returns
    /// the number of bytes enqueued, less than `data.len()` if the downlink
    /// stayed full.
    pub fn write_line(&self, data: &[u8]) -> usize {
        let shared = &*self.shared;
        let mut written = 0;

        for &byte in data {
            if !shared.downlink.push(byte, Wait::Poll) {
                // Give an idle transport the chance to drain before waiting on it
                self.wake_transport();
                if !shared.downlink.push(byte, Wait::For(shared.settings.byte_timeout)) {
                    shared.stats.add_partial_write();
                    warn!(
                        channel = shared.downlink.name(),
                        written,
                        requested = data.len(),
                        "channel full, write cut short"
                    );
                    break;
                }
            }
            written += 1;
        }

        let lines = data[..written].iter().filter(|&&b| b == NEWLINE).count();
        shared.stats.add_lines_out(lines);

        // Always wake: the transport may have gone idle between bytes
        if written > 0 {
            self.wake_transport();
        }
        written
    }

    /// Take one received byte
    ///
    /// In line mode bytes are handed out only from complete lines. With
    /// `block` the call waits until a byte arrives or `stop` is raised,
    /// otherwise up to the byte timeout.
    pub fn get_byte(&self, block: bool, stop: &AtomicBool) -> Option<u8> {
        let settings = &self.shared.settings;
        let wait = if block {
            Wait::Forever
        } else {
            Wait::For(settings.byte_timeout)
        };

        match settings.uplink_mode {
            UplinkMode::Raw => self.pop_within(wait, stop).ok(),
            UplinkMode::Line => {
                if let Some(byte) = self.cursor.lock().next() {
                    return Some(byte);
                }

                // A line never exceeds the uplink capacity, so this cannot overflow
                let mut line = vec![0u8; settings.capacity];
                let len = self.read_line_within(&mut line, wait, stop).ok()?;
                line.truncate(len);

                let mut cursor = self.cursor.lock();
                cursor.refill(line);
                cursor.next()
            }
        }
    }

    /// Enqueue one byte without waiting and without waking the transport
    pub fn put_byte(&self, byte: u8) -> bool {
        let queued = self.shared.downlink.push(byte, Wait::Poll);
        if !queued {
            self.shared.stats.add_partial_write();
            debug!("downlink full, byte not queued");
        }
        queued
    }

    /// Format and enqueue text, bounded to one channel's worth of bytes
    ///
    /// ```ignore
    /// bridge.print(format_args!("uptime {}s\n", secs));
    /// ```
    pub fn print(&self, args: fmt::Arguments<'_>) -> usize {
        let text = args.to_string();
        let len = text.len().min(self.shared.settings.capacity);
        self.write_line(&text.as_bytes()[..len])
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{BridgeConfig, UplinkMode};
    use crate::error::LineError;
    use crate::link::{LinkBridge, Wait};
    use crate::transport::MemoryLink;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn setup(config: BridgeConfig) -> (Arc<MemoryLink>, Arc<LinkBridge>) {
        let link = Arc::new(MemoryLink::new());
        let bridge = Arc::new(LinkBridge::new(&config, link.clone()));
        bridge.init();
        (link, bridge)
    }

    fn fast() -> BridgeConfig {
        BridgeConfig {
            byte_timeout_ms: 20,
            ..BridgeConfig::default()
        }
    }

    #[test]
    fn test_read_line_blocks_until_terminator() {
        let (link, bridge) = setup(fast());
        let stop = Arc::new(AtomicBool::new(false));

        let reader = {
            let bridge = bridge.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 64];
                bridge.read_line(&mut buf, &stop).map(|n| buf[..n].to_vec())
            })
        };

        link.deliver(b"ab");
        thread::sleep(Duration::from_millis(30));
        assert!(!reader.is_finished());

        link.deliver(b"c\n");
        assert_eq!(reader.join().unwrap().unwrap(), b"abc\n");
    }

    #[test]
    fn test_two_lines_in_one_chunk() {
        let (link, bridge) = setup(fast());
        let stop = AtomicBool::new(false);
        link.deliver(b"x\ny\n");

        let mut buf = [0u8; 8];
        assert_eq!(bridge.read_line(&mut buf, &stop), Ok(2));
        assert_eq!(&buf[..2], b"x\n");
        assert_eq!(bridge.read_line(&mut buf, &stop), Ok(2));
        assert_eq!(&buf[..2], b"y\n");
    }

    #[test]
    fn test_overflow_drains_whole_line() {
        let (link, bridge) = setup(fast());
        let stop = AtomicBool::new(false);
        let mut line = vec![b'a'; 299];
        line.push(b'\n');
        link.deliver(&line);

        let mut buf = [0u8; 256];
        let result = bridge.read_line(&mut buf, &stop);
        assert_eq!(
            result,
            Err(LineError::Overflow {
                copied: 256,
                line_len: 300
            })
        );
        assert_eq!(bridge.pending_receive_len(), 0);
        assert_eq!(bridge.pending_lines(), 0);
        assert_eq!(bridge.stats().snapshot().overflows, 1);

        link.deliver(b"ok\n");
        assert_eq!(bridge.read_line(&mut buf, &stop), Ok(3));
    }

    #[test]
    fn test_read_line_cancelled_by_stop() {
        let (_link, bridge) = setup(fast());
        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let bridge = bridge.clone();
            let stop = stop.clone();
            thread::spawn(move || bridge.read_line(&mut [0u8; 16], &stop))
        };
        thread::sleep(Duration::from_millis(20));
        stop.store(true, Ordering::SeqCst);
        assert_eq!(reader.join().unwrap(), Err(LineError::Cancelled));
    }

    #[test]
    fn test_read_line_within_times_out() {
        let (link, bridge) = setup(fast());
        link.deliver(b"no terminator");
        let result = bridge.read_line_within(
            &mut [0u8; 32],
            Wait::For(Duration::from_millis(20)),
            &AtomicBool::new(false),
        );
        assert_eq!(result, Err(LineError::TimedOut));
    }

    #[test]
    fn test_embedded_nul_is_data() {
        let (link, bridge) = setup(fast());
        link.deliver(b"a\0b\n");
        let mut buf = [0u8; 8];
        assert_eq!(bridge.read_line(&mut buf, &AtomicBool::new(false)), Ok(4));
        assert_eq!(&buf[..4], b"a\0b\n");
    }

    #[test]
    fn test_write_line_wakes_transport() {
        let (link, bridge) = setup(fast());
        assert_eq!(bridge.write_line(b"hello\n"), 6);
        assert!(link.notifications() >= 1);
        assert_eq!(link.pending(), 6);
        assert_eq!(bridge.stats().snapshot().lines_out, 1);
    }

    #[test]
    fn test_write_line_backpressure_returns_partial() {
        let (link, bridge) = setup(BridgeConfig {
            channel_capacity: 256,
            ..fast()
        });
        let data = vec![b'z'; 300];

        let start = Instant::now();
        let written = bridge.write_line(&data);
        assert_eq!(written, 256);
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(link.pending(), 256);
        assert_eq!(bridge.stats().snapshot().partial_writes, 1);
    }

    #[test]
    fn test_get_byte_is_line_buffered() {
        let (link, bridge) = setup(fast());
        let stop = AtomicBool::new(false);
        link.deliver(b"hi");
        assert_eq!(bridge.get_byte(false, &stop), None);

        link.deliver(b"\n");
        assert_eq!(bridge.get_byte(false, &stop), Some(b'h'));
        assert_eq!(bridge.get_byte(false, &stop), Some(b'i'));
        assert_eq!(bridge.get_byte(true, &stop), Some(b'\n'));
        assert_eq!(bridge.get_byte(false, &stop), None);
    }

    #[test]
    fn test_blocking_get_byte_returns_on_stop() {
        for mode in [UplinkMode::Line, UplinkMode::Raw] {
            let (_link, bridge) = setup(BridgeConfig {
                uplink_mode: mode,
                ..fast()
            });
            let stop = Arc::new(AtomicBool::new(false));
            let reader = {
                let bridge = bridge.clone();
                let stop = stop.clone();
                thread::spawn(move || bridge.get_byte(true, &stop))
            };
            thread::sleep(Duration::from_millis(20));
            stop.store(true, Ordering::SeqCst);

            let start = Instant::now();
            assert_eq!(reader.join().unwrap(), None);
            assert!(start.elapsed() < Duration::from_secs(1), "{:?}", mode);
        }
    }

    #[test]
    fn test_put_byte_and_print() {
        let (link, bridge) = setup(fast());
        assert!(bridge.put_byte(b'>'));
        assert_eq!(link.notifications(), 0);

        let n = bridge.print(format_args!(" {} + {} = {}\n", 1, 2, 1 + 2));
        assert_eq!(n, 11);
        assert_eq!(link.pull(64, Duration::ZERO).as_ref(), b"> 1 + 2 = 3\n");
    }

    #[test]
    fn test_print_truncates_to_capacity() {
        let (link, bridge) = setup(BridgeConfig {
            channel_capacity: 256,
            ..fast()
        });
        let long = "x".repeat(400);
        assert_eq!(bridge.print(format_args!("{}", long)), 256);
        assert_eq!(link.pending(), 256);
    }

    #[test]
    fn test_raw_mode_delivers_partial_lines() {
        let (link, bridge) = setup(BridgeConfig {
            uplink_mode: UplinkMode::Raw,
            ..fast()
        });
        let stop = AtomicBool::new(false);
        link.deliver(b"par");

        let mut buf = [0u8; 16];
        assert_eq!(bridge.read_line(&mut buf, &stop), Ok(3));
        assert_eq!(&buf[..3], b"par");

        link.deliver(b"tial\nnext\n");
        assert_eq!(bridge.read_line(&mut buf, &stop), Ok(5));
        assert_eq!(&buf[..5], b"tial\n");
        assert_eq!(bridge.get_byte(false, &stop), Some(b'n'));
    }

    #[test]
    fn test_raw_mode_times_out() {
        let (_link, bridge) = setup(BridgeConfig {
            uplink_mode: UplinkMode::Raw,
            ..fast()
        });
        let result = bridge.read_line_within(
            &mut [0u8; 4],
            Wait::For(Duration::from_millis(20)),
            &AtomicBool::new(false),
        );
        assert_eq!(result, Err(LineError::TimedOut));
    }
}
