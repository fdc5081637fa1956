//! Centralized error types for the bridge
//!
//! Setup and I/O failures are represented by the `BridgeError` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, BridgeError>`.
//!
//! Transient read-side outcomes (truncation, cancellation, timeouts) are
//! `LineError` values. They are never fatal.

use std::fmt;
use std::path::PathBuf;

/// All bridge errors
#[derive(Debug)]
pub enum BridgeError {
    // === Link ===
    /// Failed to open serial port
    SerialOpen {
        port: String,
        source: std::io::Error,
    },
    /// Failed to bind UDP socket
    UdpBind { port: u16, source: std::io::Error },

    // === Config ===
    /// Config file could not be read
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config file is not valid TOML for `Config`
    ConfigParse { path: PathBuf, message: String },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },

    // === Runtime ===
    /// Tokio runtime creation failed
    Runtime { source: std::io::Error },
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SerialOpen { source, .. }
            | Self::UdpBind { source, .. }
            | Self::ConfigRead { source, .. }
            | Self::Runtime { source } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerialOpen { port, .. } => write!(f, "Cannot open serial port: {}", port),
            Self::UdpBind { port, .. } => write!(f, "Cannot bind UDP port {}", port),
            Self::ConfigRead { path, .. } => write!(f, "Cannot read config: {}", path.display()),
            Self::ConfigParse { path, message } => {
                write!(f, "Invalid config {}: {}", path.display(), message)
            }
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
            Self::Runtime { .. } => write!(f, "Failed to create runtime"),
        }
    }
}

/// Alias for Result with BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Non-fatal outcome of a line read that did not produce a whole line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineError {
    /// The line did not fit the caller's buffer.
    ///
    /// `copied` bytes (a prefix of the line) were written to the buffer; the
    /// full `line_len` bytes were drained from the uplink.
    Overflow { copied: usize, line_len: usize },
    /// Woken without any pending bytes (e.g. the uplink was flushed)
    Empty,
    /// The caller's stop flag was raised while waiting
    Cancelled,
    /// A bounded wait elapsed before a line arrived
    TimedOut,
}

impl std::error::Error for LineError {}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow { copied, line_len } => {
                write!(f, "Line of {} bytes truncated to {}", line_len, copied)
            }
            Self::Empty => write!(f, "No line pending"),
            Self::Cancelled => write!(f, "Read cancelled"),
            Self::TimedOut => write!(f, "Timed out waiting for a line"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overflow_display() {
        let err = LineError::Overflow {
            copied: 256,
            line_len: 300,
        };
        assert_eq!(err.to_string(), "Line of 300 bytes truncated to 256");
    }

    #[test]
    fn test_config_validation_display() {
        let err = BridgeError::ConfigValidation {
            field: "bridge.channel_capacity",
            reason: "must be at least 256".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid bridge.channel_capacity: must be at least 256"
        );
    }

    #[test]
    fn test_udp_bind_has_source() {
        use std::error::Error;
        let err = BridgeError::UdpBind {
            port: 9300,
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.source().is_some());
    }
}
