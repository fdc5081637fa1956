use super::Shell;
use crate::constants::{LINE_BUFFER_SIZE, NEWLINE};
use crate::error::LineError;
use crate::link::LinkBridge;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Writes every received line back to the peer
pub struct EchoShell;

impl Shell for EchoShell {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn run(&self, link: &LinkBridge, stop: &AtomicBool) {
        let mut buf = [0u8; LINE_BUFFER_SIZE];

        while !stop.load(Ordering::Relaxed) {
            match link.read_line(&mut buf, stop) {
                Ok(n) => {
                    link.write_line(&buf[..n]);
                }
                Err(LineError::Overflow { copied, line_len }) => {
                    debug!(copied, line_len, "echoing truncated line");
                    link.write_line(&buf[..copied]);
                    link.write_line(&[NEWLINE]);
                }
                Err(LineError::Cancelled) => break,
                Err(LineError::Empty | LineError::TimedOut) => {}
            }
        }
    }
}
