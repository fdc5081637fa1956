//! `std::io` view of the bridge
//!
//! Lets a shell treat the link as its stdin/stdout: every `read` yields one
//! complete line, every `write` enqueues as much as the downlink accepts.

use super::LinkBridge;
use crate::error::LineError;
use std::io;
use std::sync::atomic::AtomicBool;

/// Blocking reader/writer bound to one consumer's stop flag
pub struct Console<'a> {
    link: &'a LinkBridge,
    stop: &'a AtomicBool,
}

impl<'a> Console<'a> {
    pub fn new(link: &'a LinkBridge, stop: &'a AtomicBool) -> Self {
        Self { link, stop }
    }
}

impl io::Read for Console<'_> {
    /// Reads one line. A truncated line yields its prefix; a raised stop flag
    /// reads as end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.link.read_line(buf, self.stop) {
            Ok(n) => Ok(n),
            Err(LineError::Overflow { copied, .. }) => Ok(copied),
            Err(LineError::Cancelled) => Ok(0),
            Err(e @ (LineError::Empty | LineError::TimedOut)) => {
                Err(io::Error::new(io::ErrorKind::WouldBlock, e))
            }
        }
    }
}

impl io::Write for Console<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        match self.link.write_line(buf) {
            0 => Err(io::Error::new(io::ErrorKind::TimedOut, "downlink full")),
            n => Ok(n),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.link.wake_transport();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::BridgeConfig;
    use crate::link::LinkBridge;
    use crate::transport::MemoryLink;
    use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (Arc<MemoryLink>, LinkBridge) {
        let link = Arc::new(MemoryLink::new());
        let config = BridgeConfig {
            channel_capacity: 256,
            byte_timeout_ms: 10,
            ..BridgeConfig::default()
        };
        let bridge = LinkBridge::new(&config, link.clone());
        bridge.init();
        (link, bridge)
    }

    #[test]
    fn test_read_yields_one_line() {
        let (link, bridge) = setup();
        let stop = AtomicBool::new(false);
        link.deliver(b"first\nsecond\n");

        let mut console = bridge.console(&stop);
        let mut buf = [0u8; 64];
        assert_eq!(console.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"first\n");
    }

    #[test]
    fn test_buf_reader_lines() {
        let (link, bridge) = setup();
        let stop = AtomicBool::new(false);
        link.deliver(b"help\n");

        let mut reader = BufReader::new(bridge.console(&stop));
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "help\n");
    }

    #[test]
    fn test_cancelled_read_is_eof() {
        let (_link, bridge) = setup();
        let stop = AtomicBool::new(true);
        let mut buf = [0u8; 8];
        assert_eq!(bridge.console(&stop).read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_writeln_reaches_transport() {
        let (link, bridge) = setup();
        let stop = AtomicBool::new(false);
        let mut console = bridge.console(&stop);
        writeln!(console, "status: {}", "ok").unwrap();
        console.flush().unwrap();
        assert_eq!(link.pull(64, Duration::ZERO).as_ref(), b"status: ok\n");
    }

    #[test]
    fn test_write_to_full_downlink_times_out() {
        let (_link, bridge) = setup();
        let stop = AtomicBool::new(false);
        let mut console = bridge.console(&stop);
        assert_eq!(console.write(&[b'x'; 300]).unwrap(), 256);
        let err = console.write(b"more").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }
}
