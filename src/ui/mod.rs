pub mod output;
pub mod progress;
pub mod reporter;
pub mod signals;

pub use output::{OutputFormatter, OutputMode};
pub use progress::ProgressManager;
pub use reporter::TerminalReporter;
pub use signals::{parse_command, spawn_stdin_commands, GracefulShutdown};
