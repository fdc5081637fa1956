//! Line consumers run once per connected session
//!
//! A shell owns the blocking side of the bridge for as long as the session
//! lasts. It must return promptly once `stop` is raised; every blocking call
//! it makes on the bridge already observes the flag.

mod commands;
mod echo;

pub use commands::CommandShell;
pub use echo::EchoShell;

use crate::config::{SessionConfig, ShellKind};
use crate::constants::STOP_CHECK_INTERVAL_MS;
use crate::link::LinkBridge;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Blocking consumer of the line console
pub trait Shell: Send + Sync + 'static {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Serve one session until `stop` is raised
    fn run(&self, link: &LinkBridge, stop: &AtomicBool);
}

/// Build the shell selected by `session.shell`
pub fn from_config(config: &SessionConfig) -> Arc<dyn Shell> {
    match config.shell {
        ShellKind::Echo => Arc::new(EchoShell),
        ShellKind::Commands => Arc::new(CommandShell::new(
            config.prompt.clone(),
            config.startup_delay(),
        )),
    }
}

/// Sleep for `duration` in short slices; returns false if `stop` was raised
pub(crate) fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    let slice = Duration::from_millis(STOP_CHECK_INTERVAL_MS);
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(slice.min(deadline - now));
    }
}
