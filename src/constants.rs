//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Framing
// =============================================================================

/// Line terminator for both directions
pub const NEWLINE: u8 = b'\n';

// =============================================================================
// Buffers
// =============================================================================

/// Default capacity of each byte channel (uplink and downlink)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 512;

/// Smallest channel capacity accepted by config validation
pub const MIN_CHANNEL_CAPACITY: usize = 256;

/// Line buffer handed to `read_line` by the bundled shells
pub const LINE_BUFFER_SIZE: usize = 256;

/// UDP receive buffer size
pub const UDP_BUFFER_SIZE: usize = 4096;

// =============================================================================
// Timing - Data path
// =============================================================================

/// Per-byte wait when the consumer writes into a full downlink (milliseconds)
pub const DEFAULT_BYTE_TIMEOUT_MS: u64 = 1000;

/// Total wait a transport callback may spend pushing one chunk (milliseconds)
pub const DEFAULT_INGRESS_TIMEOUT_MS: u64 = 2;

/// Upper bound for the ingress wait; transport callbacks must not stall
pub const MAX_INGRESS_TIMEOUT_MS: u64 = 10;

/// Per-byte deadline used by blocking transports when pulling sends (milliseconds)
pub const DEFAULT_SEND_DEADLINE_MS: u64 = 10;

/// Wake-up period of blocking waits that must observe a stop flag (milliseconds)
pub const STOP_CHECK_INTERVAL_MS: u64 = 100;

// =============================================================================
// Timing - Session
// =============================================================================

/// Connection state polling interval (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Delay before a freshly started shell greets the peer (milliseconds)
pub const DEFAULT_STARTUP_DELAY_MS: u64 = 500;

/// Minimum interval between rate updates (seconds)
pub const RATE_UPDATE_MIN_INTERVAL_SECS: f64 = 0.1;

// =============================================================================
// Link
// =============================================================================

/// Default UDP port the simulated link listens on
pub const DEFAULT_UDP_PORT: u16 = 9300;

/// Peer silence after which the UDP link reports "not connected" (milliseconds)
pub const DEFAULT_PEER_TIMEOUT_MS: u64 = 3000;

/// Default payload per outbound packet (BLE default ATT payload)
pub const DEFAULT_MTU: usize = 20;

/// Baud rate for serial-attached radio modules
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Maximum socket bind retry attempts
pub const MAX_SOCKET_RETRY_ATTEMPTS: u32 = 5;

/// Base delay between retry attempts (milliseconds)
pub const RETRY_BASE_DELAY_MS: u64 = 200;

/// Consecutive zero-byte reads before assuming port disconnected
pub const SERIAL_DISCONNECT_THRESHOLD: u32 = 10;

/// Delay between attempts to reopen a lost serial port (seconds)
pub const RECONNECT_DELAY_SECS: u64 = 2;
