//! Line-framed console over a chunked, asynchronous link
//!
//! - `link` - the bridge: byte channels, line framing, transport callbacks
//! - `transport` - the transport interface plus UDP, serial and in-memory links
//! - `session` - starts and stops the consumer as the link comes and goes
//! - `shell` - consumers run on top of the console

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod link;
pub mod logging;
pub mod session;
pub mod shell;
pub mod transport;

pub use error::{BridgeError, LineError, Result};
pub use link::LinkBridge;
