use crate::error::{HarvestError, Result};
use crate::navigate::{Command, ControlHandle};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Turns Ctrl+C into a `Stop` command; a second Ctrl+C exits immediately.
pub struct GracefulShutdown {
    requested: Arc<AtomicBool>,
}

impl GracefulShutdown {
    pub fn new(controls: ControlHandle) -> Result<Self> {
        let requested = Arc::new(AtomicBool::new(false));
        let requested_clone = requested.clone();

        ctrlc::set_handler(move || {
            if !requested_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\n🛑 Stopping after the current step... (press Ctrl+C again to force exit)");
                controls.stop();
            } else {
                eprintln!("\n💀 Force stopping...");
                std::process::exit(130);
            }
        })
        .map_err(|e| HarvestError::Config {
            message: format!("Failed to set signal handler: {}", e),
        })?;

        Ok(Self { requested })
    }

    /// A handle that never fires; no signal handler is registered.
    pub fn disabled() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Maps an operator line to a run command.
pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "p" | "pause" | "pausar" => Some(Command::Pause),
        "r" | "resume" | "retomar" => Some(Command::Resume),
        "s" | "stop" | "parar" => Some(Command::Stop),
        _ => None,
    }
}

/// Forwards `p`/`r`/`s` lines typed on stdin to the run until stdin closes
/// or a stop is sent.
pub fn spawn_stdin_commands(controls: ControlHandle) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if let Some(command) = parse_command(&line) {
                controls.send(command);
                if command == Command::Stop {
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("p"), Some(Command::Pause));
        assert_eq!(parse_command("  Resume \n"), Some(Command::Resume));
        assert_eq!(parse_command("parar"), Some(Command::Stop));
        assert_eq!(parse_command("what"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_disabled_shutdown_is_never_requested() {
        let shutdown = GracefulShutdown::disabled();
        assert!(!shutdown.is_requested());
    }
}
