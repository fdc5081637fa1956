//! Prompt-driven shell with a handful of built-in commands

use super::{sleep_unless_stopped, Shell};
use crate::link::LinkBridge;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

const BANNER: &str = "\nThis is the link console.\nType 'help' to get the list of commands.\n";

const HELP: &str = "\
help            list commands
stats           show link counters and rates
echo <text>     print <text>
flush           discard everything queued in both directions
history         list commands entered this session
";

/// Interactive command shell
pub struct CommandShell {
    prompt: String,
    startup_delay: Duration,
}

impl CommandShell {
    pub fn new(prompt: impl Into<String>, startup_delay: Duration) -> Self {
        Self {
            prompt: prompt.into(),
            startup_delay,
        }
    }

    /// Run one command line and return the reply text
    fn execute(&self, link: &LinkBridge, command: &str, history: &[String]) -> String {
        let (name, args) = command
            .split_once(char::is_whitespace)
            .map(|(name, args)| (name, args.trim_start()))
            .unwrap_or((command, ""));

        match name {
            "help" => HELP.to_string(),
            "stats" => {
                let snap = link.stats().snapshot();
                let (tx_rate, rx_rate) = link.stats().update_rates();
                format!(
                    "rx {} B ({:.1} KB/s), tx {} B ({:.1} KB/s)\n\
                     lines in {}, lines out {}\n\
                     dropped {} B, overflows {}, partial writes {}\n",
                    snap.rx_bytes,
                    rx_rate,
                    snap.tx_bytes,
                    tx_rate,
                    snap.lines_in,
                    snap.lines_out,
                    snap.dropped_bytes,
                    snap.overflows,
                    snap.partial_writes
                )
            }
            "echo" => format!("{}\n", args),
            "flush" => {
                let (uplink, downlink) = link.flush();
                format!("flushed {} bytes in, {} bytes out\n", uplink, downlink)
            }
            "history" => history
                .iter()
                .enumerate()
                .map(|(i, entry)| format!("{:4}  {}\n", i + 1, entry))
                .collect(),
            _ => "Unrecognized command\n".to_string(),
        }
    }
}

impl Shell for CommandShell {
    fn name(&self) -> &'static str {
        "commands"
    }

    fn run(&self, link: &LinkBridge, stop: &AtomicBool) {
        if !sleep_unless_stopped(self.startup_delay, stop) {
            return;
        }

        let mut input = BufReader::with_capacity(link.settings().capacity, link.console(stop));
        let mut output = link.console(stop);
        let mut history = Vec::new();
        info!("command shell started");

        emit(&mut output, BANNER);

        while !stop.load(Ordering::Relaxed) {
            emit(&mut output, &self.prompt);

            let mut line = String::new();
            match input.read_line(&mut line) {
                // Stop raised
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    emit(&mut output, "Input is not valid UTF-8\n");
                    continue;
                }
                Err(e) => {
                    debug!(error = %e, "console read failed");
                    break;
                }
            }

            let command = line.trim();
            if command.is_empty() {
                continue;
            }
            debug!(command, "running command");

            let reply = self.execute(link, command, &history);
            history.push(command.to_string());
            emit(&mut output, &reply);
        }

        info!("command shell stopped");
    }
}

/// Write text to the peer; a full downlink only loses this output
fn emit(output: &mut impl Write, text: &str) {
    let result = output
        .write_all(text.as_bytes())
        .and_then(|_| output.flush());
    if let Err(e) = result {
        debug!(error = %e, "console output dropped");
    }
}
