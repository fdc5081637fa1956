//! Configuration management
//!
//! Config is read from a TOML file (`link-console.toml` by default).
//! Every section and field is optional; missing values fall back to defaults.

use crate::constants::{
    DEFAULT_BAUD_RATE, DEFAULT_BYTE_TIMEOUT_MS, DEFAULT_CHANNEL_CAPACITY,
    DEFAULT_INGRESS_TIMEOUT_MS, DEFAULT_MTU, DEFAULT_PEER_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_SEND_DEADLINE_MS, DEFAULT_STARTUP_DELAY_MS, DEFAULT_UDP_PORT, MAX_INGRESS_TIMEOUT_MS,
    MIN_CHANNEL_CAPACITY,
};
use crate::error::{BridgeError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "link-console.toml";

// =============================================================================
// Application Configuration
// =============================================================================

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub link: LinkConfig,
    pub bridge: BridgeConfig,
    pub session: SessionConfig,
}

// =============================================================================
// Link Configuration
// =============================================================================

/// Which transport stands in for the wireless link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// UDP peer acting as the remote central
    #[default]
    Udp,
    /// Serial-attached UART radio module
    Serial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Transport type
    pub transport: LinkKind,

    /// UDP port to listen on
    /// Only used when transport = Udp
    pub udp_port: u16,

    /// Peer silence after which the link counts as disconnected
    /// Only used when transport = Udp
    pub peer_timeout_ms: u64,

    /// Maximum payload per outbound packet
    pub mtu: usize,

    /// Serial port name
    /// Only used when transport = Serial
    pub serial_port: String,

    /// Serial baud rate
    pub baud_rate: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            transport: LinkKind::Udp,
            udp_port: DEFAULT_UDP_PORT,
            peer_timeout_ms: DEFAULT_PEER_TIMEOUT_MS,
            mtu: DEFAULT_MTU,
            serial_port: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl LinkConfig {
    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }
}

// =============================================================================
// Bridge Configuration
// =============================================================================

/// How the uplink is handed to the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UplinkMode {
    /// Only complete, terminator-delimited lines are delivered
    #[default]
    Line,
    /// Whatever is queued is delivered, up to the first terminator
    Raw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Capacity of each byte channel
    pub channel_capacity: usize,

    /// Per-byte wait when writing into a full downlink
    pub byte_timeout_ms: u64,

    /// Total wait a transport callback may spend pushing one chunk
    pub ingress_timeout_ms: u64,

    /// Per-byte deadline blocking transports pass when pulling sends
    pub send_deadline_ms: u64,

    /// Line-buffered or raw uplink
    pub uplink_mode: UplinkMode,

    /// Trace every chunk crossing the link
    pub trace_traffic: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            byte_timeout_ms: DEFAULT_BYTE_TIMEOUT_MS,
            ingress_timeout_ms: DEFAULT_INGRESS_TIMEOUT_MS,
            send_deadline_ms: DEFAULT_SEND_DEADLINE_MS,
            uplink_mode: UplinkMode::Line,
            trace_traffic: false,
        }
    }
}

impl BridgeConfig {
    pub fn byte_timeout(&self) -> Duration {
        Duration::from_millis(self.byte_timeout_ms)
    }

    pub fn ingress_timeout(&self) -> Duration {
        Duration::from_millis(self.ingress_timeout_ms)
    }

    pub fn send_deadline(&self) -> Duration {
        Duration::from_millis(self.send_deadline_ms)
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Consumer started for each connected session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    /// Write every received line back
    Echo,
    /// Prompt-driven built-in commands
    #[default]
    Commands,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Connection state polling interval
    pub poll_interval_ms: u64,

    /// Delay before the shell greets a new peer
    pub startup_delay_ms: u64,

    /// Flush both channels whenever a new session starts
    pub flush_on_connect: bool,

    /// Consumer to run
    pub shell: ShellKind,

    /// Prompt printed by the command shell
    pub prompt: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            startup_delay_ms: DEFAULT_STARTUP_DELAY_MS,
            flush_on_connect: true,
            shell: ShellKind::Commands,
            prompt: "link> ".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

// =============================================================================
// Load / validate
// =============================================================================

impl Config {
    /// Reject values the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.bridge.channel_capacity < MIN_CHANNEL_CAPACITY {
            return Err(BridgeError::ConfigValidation {
                field: "bridge.channel_capacity",
                reason: format!("must be at least {}", MIN_CHANNEL_CAPACITY),
            });
        }
        if self.bridge.ingress_timeout_ms > MAX_INGRESS_TIMEOUT_MS {
            return Err(BridgeError::ConfigValidation {
                field: "bridge.ingress_timeout_ms",
                reason: format!("must not exceed {} ms", MAX_INGRESS_TIMEOUT_MS),
            });
        }
        if self.session.poll_interval_ms == 0 {
            return Err(BridgeError::ConfigValidation {
                field: "session.poll_interval_ms",
                reason: "must be non-zero".into(),
            });
        }
        if self.link.mtu == 0 {
            return Err(BridgeError::ConfigValidation {
                field: "link.mtu",
                reason: "must be non-zero".into(),
            });
        }
        Ok(())
    }
}

/// Parse config from TOML text
pub fn parse(content: &str, path: &Path) -> Result<Config> {
    let config: Config = toml::from_str(content).map_err(|e| BridgeError::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or defaults if the file does not exist
pub fn load(path: &Path) -> Result<Config> {
    if !path.exists() {
        info!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|e| BridgeError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse(&content, path)
}

// ============================================================================
// Tests
// ============================================================================
