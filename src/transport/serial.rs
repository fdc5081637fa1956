//! Serial transport, for a peer on a UART or USB CDC port
//!
//! Uses blocking threads:
//! - Reader thread: reads from the port, pushes chunks into the sink
//! - Writer thread: sleeps until notified, pulls packets and writes them out
//!
//! The port counts as connected from a successful open until it
//! disconnects (detected via consecutive empty reads or an I/O error) or
//! `shutdown` is set.

use super::{LinkSink, LinkTransport};
use crate::constants::{SERIAL_DISCONNECT_THRESHOLD, UDP_BUFFER_SIZE};
use crate::error::{BridgeError, Result};
use parking_lot::{Condvar, Mutex, RwLock};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Read timeout, also bounds how long shutdown takes to be noticed
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// Writer wake-up period without a notify
const WRITER_POLL: Duration = Duration::from_millis(100);

struct SerialState {
    sink: RwLock<Option<Arc<dyn LinkSink>>>,
    connected: AtomicBool,
    /// Bumped on every open; threads of an older open stand down
    generation: AtomicU64,
    /// Set by `notify_data_available`, cleared by the writer
    wake: Mutex<bool>,
    wake_cv: Condvar,
}

impl SerialState {
    fn sink(&self) -> Option<Arc<dyn LinkSink>> {
        self.sink.read().clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn disconnect(&self, generation: u64, port: &str, reason: &str) {
        if !self.is_current(generation) {
            return;
        }
        if self.connected.swap(false, Ordering::SeqCst) {
            warn!(port, reason, "serial link disconnected");
        }
        // Release the writer if it is waiting
        *self.wake.lock() = true;
        self.wake_cv.notify_all();
    }
}

/// Serial link transport
///
/// # Example
///
/// ```ignore
/// let link = Arc::new(SerialLink::new("/dev/ttyUSB0", 115_200, 20, Duration::from_millis(10)));
/// link.spawn(shutdown.clone())?;
/// ```
pub struct SerialLink {
    port_name: String,
    baud_rate: u32,
    mtu: usize,
    send_deadline: Duration,
    state: Arc<SerialState>,
}

impl SerialLink {
    pub fn new(
        port_name: impl Into<String>,
        baud_rate: u32,
        mtu: usize,
        send_deadline: Duration,
    ) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            mtu,
            send_deadline,
            state: Arc::new(SerialState {
                sink: RwLock::new(None),
                connected: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                wake: Mutex::new(false),
                wake_cv: Condvar::new(),
            }),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Open the serial port with a short read timeout
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Box<dyn serialport::SerialPort>> {
        serialport::new(port_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| BridgeError::SerialOpen {
                port: port_name.to_string(),
                source: std::io::Error::other(e.to_string()),
            })
    }

    /// Open the port and start the reader and writer threads
    ///
    /// May be called again after a disconnect to reopen the port.
    pub fn spawn(&self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let port_read = Self::open(&self.port_name, self.baud_rate)?;
        let port_write = port_read.try_clone().map_err(|e| BridgeError::SerialOpen {
            port: self.port_name.clone(),
            source: std::io::Error::other(e.to_string()),
        })?;

        let generation = self.state.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.connected.store(true, Ordering::SeqCst);
        info!(port = %self.port_name, baud = self.baud_rate, "serial link open");

        // Reader thread (blocking)
        let state = self.state.clone();
        let shutdown_reader = shutdown.clone();
        let name = self.port_name.clone();
        std::thread::spawn(move || {
            let mut port = port_read;
            let mut buf = [0u8; UDP_BUFFER_SIZE];
            let mut consecutive_errors = 0u32;

            while !shutdown_reader.load(Ordering::Relaxed) && state.is_current(generation) {
                match port.read(&mut buf) {
                    Ok(n) if n > 0 => {
                        consecutive_errors = 0;
                        match state.sink() {
                            Some(sink) => {
                                let accepted = sink.on_chunk_received(&buf[..n]);
                                if accepted < n {
                                    debug!(accepted, len = n, "short write into uplink");
                                }
                            }
                            None => debug!(len = n, "no bridge registered, dropping chunk"),
                        }
                    }
                    Ok(_) => {
                        // Zero bytes read - could be normal or port gone
                        consecutive_errors += 1;
                        if consecutive_errors > SERIAL_DISCONNECT_THRESHOLD {
                            state.disconnect(generation, &name, "repeated empty reads");
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {
                        consecutive_errors = 0;
                    }
                    Err(e) => {
                        state.disconnect(generation, &name, &e.to_string());
                        break;
                    }
                }
            }
        });

        // Writer thread (blocking)
        let state = self.state.clone();
        let name = self.port_name.clone();
        let mtu = self.mtu;
        let send_deadline = self.send_deadline;
        std::thread::spawn(move || {
            let mut port = port_write;
            let mut packet = vec![0u8; mtu];

            while !shutdown.load(Ordering::Relaxed) {
                {
                    let mut woken = state.wake.lock();
                    if !*woken {
                        state.wake_cv.wait_for(&mut woken, WRITER_POLL);
                    }
                    *woken = false;
                }
                if !state.is_current(generation) || !state.connected.load(Ordering::SeqCst) {
                    break;
                }

                let Some(sink) = state.sink() else {
                    continue;
                };
                while sink.pending_send_len() > 0 {
                    let filled = sink.on_send_requested(&mut packet, send_deadline);
                    if filled == 0 {
                        break;
                    }
                    if let Err(e) = port.write_all(&packet[..filled]) {
                        state.disconnect(generation, &name, &e.to_string());
                        return;
                    }
                }
            }
        });

        Ok(())
    }
}

impl LinkTransport for SerialLink {
    fn register(&self, sink: Arc<dyn LinkSink>) {
        *self.state.sink.write() = Some(sink);
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    fn notify_data_available(&self) {
        *self.state.wake.lock() = true;
        self.state.wake_cv.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_link_new() {
        let link = SerialLink::new("COM3", 115_200, 20, Duration::from_millis(10));
        assert_eq!(link.port_name(), "COM3");
        assert!(!link.is_connected());
    }

    #[test]
    fn test_open_missing_port_fails() {
        let link = SerialLink::new("/dev/does-not-exist", 9600, 20, Duration::ZERO);
        let err = link.spawn(Arc::new(AtomicBool::new(false))).unwrap_err();
        assert!(matches!(err, BridgeError::SerialOpen { .. }));
        assert!(!link.is_connected());
    }

    #[test]
    fn test_stale_generation_cannot_disconnect() {
        let link = SerialLink::new("COM3", 115_200, 20, Duration::ZERO);
        link.state.generation.store(2, Ordering::SeqCst);
        link.state.connected.store(true, Ordering::SeqCst);
        link.state.disconnect(1, "COM3", "old reader");
        assert!(link.is_connected());
        link.state.disconnect(2, "COM3", "read error");
        assert!(!link.is_connected());
    }

    #[test]
    fn test_notify_sets_wake_flag() {
        let link = SerialLink::new("COM3", 115_200, 20, Duration::ZERO);
        link.notify_data_available();
        assert!(*link.state.wake.lock());
    }
}
