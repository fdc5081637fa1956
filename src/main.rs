//! link-console - line console over a UDP or serial link
//!
//! Usage:
//!   link-console                          UDP link on the configured port
//!   link-console --port /dev/ttyUSB0      Serial link
//!   link-console --shell echo -v          Echo shell, debug output

use anyhow::{bail, Result};
use clap::Parser;
use link_console::cli::Cli;
use link_console::config::{self, Config, LinkKind};
use link_console::constants::RECONNECT_DELAY_SECS;
use link_console::error::BridgeError;
use link_console::session::SessionController;
use link_console::shell;
use link_console::transport::{LinkTransport, SerialLink, UdpLink};
use link_console::{logging, LinkBridge};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_FILE));
    let mut config = config::load(&path)?;
    cli.apply(&mut config);
    config.validate()?;

    // Create tokio runtime
    let rt = tokio::runtime::Runtime::new().map_err(|e| BridgeError::Runtime { source: e })?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_handler(shutdown.clone());

    let transport: Arc<dyn LinkTransport> = match config.link.transport {
        LinkKind::Udp => {
            let link = Arc::new(UdpLink::new(
                config.link.udp_port,
                config.link.mtu,
                config.link.peer_timeout(),
            ));
            let local = link.spawn(shutdown.clone())?;
            eprintln!("Waiting for a peer on udp://{}", local);
            link
        }
        LinkKind::Serial => {
            if config.link.serial_port.is_empty() {
                bail!("serial transport needs a port (set link.serial_port or pass --port)");
            }
            let link = Arc::new(SerialLink::new(
                config.link.serial_port.clone(),
                config.link.baud_rate,
                config.link.mtu,
                config.bridge.send_deadline(),
            ));
            link.spawn(shutdown.clone())?;
            eprintln!(
                "Serial link on {} @ {} baud",
                config.link.serial_port, config.link.baud_rate
            );
            tokio::spawn(keep_serial_open(link.clone(), shutdown.clone()));
            link
        }
    };

    let bridge = Arc::new(LinkBridge::new(&config.bridge, transport));
    bridge.init();

    let shell = shell::from_config(&config.session);
    SessionController::new(bridge.clone(), shell, config.session.clone())
        .run(shutdown)
        .await?;

    let snap = bridge.stats().snapshot();
    info!(
        rx = snap.rx_bytes,
        tx = snap.tx_bytes,
        dropped = snap.dropped_bytes,
        "link console stopped"
    );
    Ok(())
}

/// Reopen the serial port after it disappears (e.g. module unplugged)
async fn keep_serial_open(link: Arc<SerialLink>, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
        if shutdown.load(Ordering::Relaxed) || link.is_connected() {
            continue;
        }
        match link.spawn(shutdown.clone()) {
            Ok(()) => info!(port = link.port_name(), "serial port reopened"),
            Err(e) => warn!(error = %e, "serial port still unavailable"),
        }
    }
}

fn spawn_signal_handler(shutdown: Arc<AtomicBool>) {
    #[cfg(unix)]
    {
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    _ => {
                        warn!("cannot install signal handlers, falling back to ctrl-c");
                        let _ = tokio::signal::ctrl_c().await;
                        shutdown.store(true, Ordering::SeqCst);
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => {},
                _ = sigint.recv() => {},
            }
            info!("shutdown requested");
            shutdown.store(true, Ordering::SeqCst);
        });
    }

    #[cfg(windows)]
    {
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.store(true, Ordering::SeqCst);
        });
    }
}
