//! UDP stand-in for the wireless link
//!
//! A remote program plays the role of the connected central: each datagram
//! it sends is one inbound chunk, and outbound data is sent back to it in
//! packets of at most `mtu` bytes. The link counts as connected while the
//! peer has been heard from within `peer_timeout` (empty datagrams work as
//! keep-alives).
//!
//! Uses async tokio tasks for I/O:
//! - RX task: receives datagrams, tracks the peer, pushes chunks into the sink
//!   on the blocking pool
//! - TX task: wakes on notify (or a short poll), pulls packets from the sink

use super::{LinkSink, LinkTransport};
use crate::constants::{MAX_SOCKET_RETRY_ATTEMPTS, RETRY_BASE_DELAY_MS, UDP_BUFFER_SIZE};
use crate::error::{BridgeError, Result};
use bytes::Bytes;
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Poll period of both tasks while idle
const IDLE_POLL: Duration = Duration::from_millis(100);

struct LinkState {
    sink: RwLock<Option<Arc<dyn LinkSink>>>,
    /// Last peer address and when it was last heard from
    peer: RwLock<Option<(SocketAddr, Instant)>>,
    peer_timeout: Duration,
    wake: Notify,
}

impl LinkState {
    fn sink(&self) -> Option<Arc<dyn LinkSink>> {
        self.sink.read().clone()
    }

    /// Record traffic from `addr`; returns whether this starts a new session
    fn touch_peer(&self, addr: SocketAddr) -> bool {
        let was_connected = self.connected_peer().is_some();
        let mut peer = self.peer.write();
        let changed = (*peer).map(|(known, _)| known != addr).unwrap_or(true);
        *peer = Some((addr, Instant::now()));
        changed || !was_connected
    }

    fn connected_peer(&self) -> Option<SocketAddr> {
        let (addr, seen) = (*self.peer.read())?;
        (seen.elapsed() < self.peer_timeout).then_some(addr)
    }
}

/// UDP link transport
///
/// # Example
///
/// ```ignore
/// let link = Arc::new(UdpLink::new(9300, 20, Duration::from_secs(3)));
/// link.spawn(shutdown.clone())?;
/// let bridge = LinkBridge::new(&config.bridge, link.clone());
/// bridge.init();
/// ```
pub struct UdpLink {
    port: u16,
    mtu: usize,
    state: Arc<LinkState>,
}

impl UdpLink {
    /// Create a link that will listen on `port` once spawned
    pub fn new(port: u16, mtu: usize, peer_timeout: Duration) -> Self {
        Self {
            port,
            mtu,
            state: Arc::new(LinkState {
                sink: RwLock::new(None),
                peer: RwLock::new(None),
                peer_timeout,
                wake: Notify::new(),
            }),
        }
    }

    /// Address of the connected peer, if any
    pub fn peer(&self) -> Option<SocketAddr> {
        self.state.connected_peer()
    }

    /// Bind the socket and start the RX/TX tasks
    ///
    /// Returns the bound address. Must be called inside a tokio runtime.
    pub fn spawn(&self, shutdown: Arc<AtomicBool>) -> Result<SocketAddr> {
        let socket = create_reusable_udp_socket(self.port)?;
        let local = socket
            .local_addr()
            .map_err(|e| BridgeError::UdpBind {
                port: self.port,
                source: e,
            })?;
        info!(%local, mtu = self.mtu, "UDP link listening");

        // RX task (async)
        let socket_rx = socket.clone();
        let state_rx = self.state.clone();
        let shutdown_rx = shutdown.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; UDP_BUFFER_SIZE];

            while !shutdown_rx.load(Ordering::Relaxed) {
                match tokio::time::timeout(IDLE_POLL, socket_rx.recv_from(&mut buf)).await {
                    Ok(Ok((len, addr))) => {
                        if state_rx.touch_peer(addr) {
                            info!(%addr, "peer connected");
                        }
                        if len == 0 {
                            // Keep-alive
                            continue;
                        }
                        let Some(sink) = state_rx.sink() else {
                            debug!(len, "no bridge registered, dropping chunk");
                            continue;
                        };
                        // The sink may wait up to the ingress timeout for uplink
                        // room, so keep it off the async worker
                        let chunk = Bytes::copy_from_slice(&buf[..len]);
                        let ingest =
                            tokio::task::spawn_blocking(move || sink.on_chunk_received(&chunk));
                        let accepted = match ingest.await {
                            Ok(accepted) => accepted,
                            Err(e) => {
                                warn!(error = %e, "uplink ingest task failed");
                                continue;
                            }
                        };
                        if accepted < len {
                            debug!(accepted, len, "short write into uplink");
                        }
                    }
                    Ok(Err(e)) => {
                        // Socket recv error - continue polling
                        debug!(error = %e, "UDP receive failed");
                    }
                    Err(_) => {
                        // Timeout - expected, allows checking shutdown flag
                    }
                }
            }
        });

        // TX task (async)
        let socket_tx = socket;
        let state_tx = self.state.clone();
        let mtu = self.mtu;
        tokio::spawn(async move {
            let mut packet = vec![0u8; mtu];

            while !shutdown.load(Ordering::Relaxed) {
                tokio::select! {
                    _ = state_tx.wake.notified() => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }

                let (Some(sink), Some(addr)) = (state_tx.sink(), state_tx.connected_peer()) else {
                    continue;
                };

                while sink.pending_send_len() > 0 {
                    // Bytes are already queued, no need to wait for more
                    let filled = sink.on_send_requested(&mut packet, Duration::ZERO);
                    if filled == 0 {
                        break;
                    }
                    if let Err(e) = socket_tx.send_to(&packet[..filled], addr).await {
                        warn!(%addr, error = %e, "UDP send failed");
                        break;
                    }
                }
            }
        });

        Ok(local)
    }
}

impl LinkTransport for UdpLink {
    fn register(&self, sink: Arc<dyn LinkSink>) {
        *self.state.sink.write() = Some(sink);
    }

    fn is_connected(&self) -> bool {
        self.state.connected_peer().is_some()
    }

    fn notify_data_available(&self) {
        self.state.wake.notify_one();
    }
}

/// Create a UDP socket with SO_REUSEADDR for quick rebind after restart
///
/// Retries a few times if the socket is still in use (e.g., from previous run).
fn create_reusable_udp_socket(port: u16) -> Result<Arc<UdpSocket>> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let map_err = |e| BridgeError::UdpBind { port, source: e };

    // Try up to MAX_SOCKET_RETRY_ATTEMPTS times with increasing delay
    for attempt in 0..MAX_SOCKET_RETRY_ATTEMPTS {
        let socket =
            Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(map_err)?;
        socket.set_reuse_address(true).map_err(map_err)?;
        socket.set_nonblocking(true).map_err(map_err)?;

        match socket.bind(&addr.into()) {
            Ok(_) => {
                let std_socket: std::net::UdpSocket = socket.into();
                let tokio_socket = UdpSocket::from_std(std_socket).map_err(map_err)?;
                return Ok(Arc::new(tokio_socket));
            }
            Err(_) if attempt < MAX_SOCKET_RETRY_ATTEMPTS - 1 => {
                // Exponential backoff: 200ms, 400ms, 800ms, 1600ms
                std::thread::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS * (1 << attempt)));
            }
            Err(e) => return Err(map_err(e)),
        }
    }

    Err(BridgeError::UdpBind {
        port,
        source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "failed after retries"),
    })
}
