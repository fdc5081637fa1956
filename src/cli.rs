//! Command-line interface definition using clap
//!
//! Every flag except `--config` and `--verbose` overrides a config value.

use crate::config::{Config, LinkKind, ShellKind};
use clap::Parser;
use std::path::PathBuf;

// =============================================================================
// CLI Definition
// =============================================================================

/// Line console over a UDP or serial link
#[derive(Parser, Debug, Default)]
#[command(name = "link-console")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: link-console.toml in the working directory)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(short, long)]
    pub verbose: bool,

    /// Link transport (overrides config)
    #[arg(long, value_enum)]
    pub transport: Option<LinkKind>,

    /// UDP port to listen on (overrides config)
    #[arg(long, value_name = "PORT")]
    pub udp_port: Option<u16>,

    /// Serial port to use (overrides config)
    #[arg(long, value_name = "PORT")]
    pub port: Option<String>,

    /// Shell to run for each session (overrides config)
    #[arg(long, value_enum)]
    pub shell: Option<ShellKind>,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(transport) = self.transport {
            config.link.transport = transport;
        }
        if let Some(port) = self.udp_port {
            config.link.udp_port = port;
        }
        if let Some(ref port) = self.port {
            config.link.serial_port = port.clone();
            // Naming a serial port implies the serial transport
            if self.transport.is_none() {
                config.link.transport = LinkKind::Serial;
            }
        }
        if let Some(shell) = self.shell {
            config.session.shell = shell;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
