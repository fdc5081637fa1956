//! Session lifecycle controller
//!
//! Polls the transport's connection state on a fixed interval and keeps
//! exactly one shell running while the link is connected:
//!
//! ```text
//!            connected, no consumer
//!   Idle ───────────────────────────► Active
//!    ▲                                  │
//!    └──────────────────────────────────┘
//!        disconnected (stop + join)
//! ```
//!
//! The consumer runs on the blocking pool. Stopping is cooperative: the
//! controller raises the consumer's stop flag and waits for it to return,
//! so a new consumer never starts while the previous one is still alive.

use crate::config::SessionConfig;
use crate::error::Result;
use crate::link::LinkBridge;
use crate::shell::Shell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Whether a consumer is held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

/// Outcome of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Idle → Active, a consumer was started
    Started,
    /// Active → Idle, the consumer was stopped or had exited
    Stopped,
    Unchanged,
}

struct Consumer {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
    session: u64,
}

/// Drives the Idle/Active state machine
pub struct SessionController {
    bridge: Arc<LinkBridge>,
    shell: Arc<dyn Shell>,
    config: SessionConfig,
    consumer: Option<Consumer>,
    sessions: u64,
}

impl SessionController {
    pub fn new(bridge: Arc<LinkBridge>, shell: Arc<dyn Shell>, config: SessionConfig) -> Self {
        Self {
            bridge,
            shell,
            config,
            consumer: None,
            sessions: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        match self.consumer {
            Some(_) => SessionState::Active,
            None => SessionState::Idle,
        }
    }

    /// Number of consumers started so far
    pub fn sessions_started(&self) -> u64 {
        self.sessions
    }

    /// Poll the connection state once and apply the matching transition
    pub async fn tick(&mut self) -> Transition {
        // A consumer that returned on its own no longer counts as held
        if self
            .consumer
            .as_ref()
            .is_some_and(|consumer| consumer.handle.is_finished())
        {
            debug!("consumer exited on its own");
            self.stop_consumer().await;
            return Transition::Stopped;
        }

        let connected = self.bridge.is_connected();
        match (connected, self.consumer.is_some()) {
            (true, false) => {
                self.start_consumer();
                Transition::Started
            }
            (false, true) => {
                self.stop_consumer().await;
                Transition::Stopped
            }
            _ => Transition::Unchanged,
        }
    }

    fn start_consumer(&mut self) {
        if self.config.flush_on_connect {
            let (uplink, downlink) = self.bridge.flush();
            if uplink > 0 || downlink > 0 {
                info!(uplink, downlink, "discarded bytes left from previous session");
            }
        }

        self.sessions += 1;
        let session = self.sessions;
        let stop = Arc::new(AtomicBool::new(false));
        let bridge = self.bridge.clone();
        let shell = self.shell.clone();
        let stop_consumer = stop.clone();
        let handle = tokio::task::spawn_blocking(move || {
            shell.run(&bridge, &stop_consumer);
        });

        info!(session, shell = self.shell.name(), "link connected, consumer started");
        self.consumer = Some(Consumer {
            stop,
            handle,
            session,
        });
    }

    /// Raise the stop flag and wait for the consumer to return
    async fn stop_consumer(&mut self) {
        let Some(consumer) = self.consumer.take() else {
            return;
        };
        consumer.stop.store(true, Ordering::SeqCst);
        // Wake a consumer blocked on a full downlink
        self.bridge.wake_transport();

        match consumer.handle.await {
            Ok(()) => info!(session = consumer.session, "consumer stopped"),
            Err(e) => error!(session = consumer.session, error = %e, "consumer task failed"),
        }
    }

    /// Poll until `shutdown` is set, then stop any running consumer
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            poll_ms = self.config.poll_interval_ms,
            shell = self.shell.name(),
            "session controller running"
        );

        while !shutdown.load(Ordering::Relaxed) {
            interval.tick().await;
            if let Transition::Stopped = self.tick().await {
                debug!(sessions = self.sessions, "session ended");
            }
        }

        self.stop_consumer().await;
        info!("session controller stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::transport::MemoryLink;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Blocks until stopped while tracking how many instances are alive
    #[derive(Default)]
    struct CountingShell {
        live: AtomicUsize,
        max_live: AtomicUsize,
        runs: AtomicUsize,
    }

    impl Shell for CountingShell {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn run(&self, link: &LinkBridge, stop: &AtomicBool) {
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_live.fetch_max(live, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 64];
            while !stop.load(Ordering::Relaxed) {
                let _ = link.read_line(&mut buf, stop);
            }
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Reads byte by byte with blocking waits
    struct ByteShell;

    impl Shell for ByteShell {
        fn name(&self) -> &'static str {
            "byte"
        }

        fn run(&self, link: &LinkBridge, stop: &AtomicBool) {
            while !stop.load(Ordering::Relaxed) {
                let _ = link.get_byte(true, stop);
            }
        }
    }

    struct ReturningShell;

    impl Shell for ReturningShell {
        fn name(&self) -> &'static str {
            "returning"
        }

        fn run(&self, _link: &LinkBridge, _stop: &AtomicBool) {}
    }

    fn setup(
        shell: Arc<dyn Shell>,
        flush: bool,
    ) -> (Arc<MemoryLink>, Arc<LinkBridge>, SessionController) {
        let link = Arc::new(MemoryLink::new());
        let bridge = Arc::new(LinkBridge::new(&BridgeConfig::default(), link.clone()));
        bridge.init();
        let config = SessionConfig {
            poll_interval_ms: 10,
            flush_on_connect: flush,
            ..SessionConfig::default()
        };
        let controller = SessionController::new(bridge.clone(), shell, config);
        (link, bridge, controller)
    }

    #[tokio::test]
    async fn test_idle_without_connection() {
        let shell = Arc::new(CountingShell::default());
        let (_link, _bridge, mut controller) = setup(shell.clone(), true);
        assert_eq!(controller.tick().await, Transition::Unchanged);
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(shell.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disconnect_stops_shell_blocked_on_byte() {
        let (link, _bridge, mut controller) = setup(Arc::new(ByteShell), true);

        link.set_connected(true);
        assert_eq!(controller.tick().await, Transition::Started);
        tokio::time::sleep(Duration::from_millis(20)).await;

        link.set_connected(false);
        let stopped = tokio::time::timeout(Duration::from_secs(3), controller.tick())
            .await
            .expect("shell blocked in get_byte was not stopped");
        assert_eq!(stopped, Transition::Stopped);
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_connect_then_disconnect() {
        let shell = Arc::new(CountingShell::default());
        let (link, _bridge, mut controller) = setup(shell.clone(), true);

        link.set_connected(true);
        assert_eq!(controller.tick().await, Transition::Started);
        assert_eq!(controller.state(), SessionState::Active);
        assert_eq!(controller.tick().await, Transition::Unchanged);

        link.set_connected(false);
        assert_eq!(controller.tick().await, Transition::Stopped);
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(shell.live.load(Ordering::SeqCst), 0);

        // Nothing left to stop
        assert_eq!(controller.tick().await, Transition::Unchanged);
    }

    #[tokio::test]
    async fn test_rapid_toggling_keeps_one_consumer() {
        let shell = Arc::new(CountingShell::default());
        let (link, _bridge, mut controller) = setup(shell.clone(), true);

        for _ in 0..20 {
            link.set_connected(true);
            assert_eq!(controller.tick().await, Transition::Started);
            // Flaps between polls are invisible
            link.set_connected(false);
            link.set_connected(true);
            assert_eq!(controller.tick().await, Transition::Unchanged);
            link.set_connected(false);
            assert_eq!(controller.tick().await, Transition::Stopped);
        }

        assert_eq!(shell.max_live.load(Ordering::SeqCst), 1);
        assert_eq!(shell.live.load(Ordering::SeqCst), 0);
        assert_eq!(controller.sessions_started(), 20);
        assert_eq!(shell.runs.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_flush_on_connect_discards_stale_bytes() {
        let shell = Arc::new(CountingShell::default());
        let (link, bridge, mut controller) = setup(shell, true);
        link.deliver(b"stale partial");
        bridge.write_line(b"old output\n");

        link.set_connected(true);
        controller.tick().await;
        assert_eq!(bridge.pending_receive_len(), 0);
        assert_eq!(bridge.pending_send_len(), 0);

        link.set_connected(false);
        controller.tick().await;
    }

    #[tokio::test]
    async fn test_without_flush_stale_bytes_survive() {
        let shell = Arc::new(CountingShell::default());
        let (link, bridge, mut controller) = setup(shell, false);
        bridge.write_line(b"old output\n");

        link.set_connected(true);
        controller.tick().await;
        assert_eq!(bridge.pending_send_len(), 11);

        link.set_connected(false);
        controller.tick().await;
    }

    #[tokio::test]
    async fn test_exited_consumer_is_reaped_and_restarted() {
        let (link, _bridge, mut controller) = setup(Arc::new(ReturningShell), true);
        link.set_connected(true);
        assert_eq!(controller.tick().await, Transition::Started);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(controller.tick().await, Transition::Stopped);
        assert_eq!(controller.tick().await, Transition::Started);
        assert_eq!(controller.sessions_started(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let shell = Arc::new(CountingShell::default());
        let (link, _bridge, controller) = setup(shell.clone(), true);
        link.set_connected(true);

        let shutdown = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(controller.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(shell.live.load(Ordering::SeqCst), 1);

        shutdown.store(true, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("controller did not stop")
            .unwrap()
            .unwrap();
        assert_eq!(shell.live.load(Ordering::SeqCst), 0);
    }
}
