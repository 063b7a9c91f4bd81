use crate::orchestrator::{EventSink, LogLevel, RunEvent};
use crate::ui::output::{OutputFormatter, OutputMode};
use crate::ui::progress::{self, ProgressManager};
use indicatif::ProgressBar;
use std::sync::Mutex;
use std::time::Instant;

/// Shows run events on the terminal: the log through the formatter, items on
/// a progress bar that is suspended while a line is printed.
pub struct TerminalReporter {
    formatter: OutputFormatter,
    progress: ProgressManager,
    bar: Mutex<Option<ProgressBar>>,
    started: Instant,
}

impl TerminalReporter {
    pub fn new(formatter: OutputFormatter, show_progress: bool) -> Self {
        let enabled = show_progress && formatter.mode() == OutputMode::Human && !formatter.is_quiet();
        Self {
            formatter,
            progress: ProgressManager::new(enabled),
            bar: Mutex::new(None),
            started: Instant::now(),
        }
    }

    fn print(&self, level: LogLevel, message: &str) {
        let formatter = &self.formatter;
        self.progress.suspend(|| match level {
            LogLevel::Info => formatter.info(message),
            LogLevel::Warn => formatter.warning(message),
            LogLevel::Error => formatter.error(message),
            LogLevel::Success => formatter.success(message),
        });
    }

    fn on_item(&self, index: usize, total: Option<usize>, name: &str) {
        let Ok(mut bar) = self.bar.lock() else {
            return;
        };
        let pb = bar.get_or_insert_with(|| self.progress.create_item_progress(total));
        progress::update_item_progress(pb, index, total, name);
    }

    fn on_finished(&self, message: &str) {
        if let Ok(mut bar) = self.bar.lock() {
            if let Some(pb) = bar.take() {
                progress::finish_progress_with_summary(&pb, message, self.started.elapsed());
            }
        }
        self.progress.clear();
    }
}

impl EventSink for TerminalReporter {
    fn emit(&self, event: RunEvent) {
        if self.formatter.mode() == OutputMode::Json {
            if let Ok(value) = serde_json::to_value(&event) {
                self.formatter.json_line(&value);
            }
            return;
        }

        match event {
            RunEvent::Item { index, total, name } => {
                self.on_item(index, total, &name);
                self.progress
                    .suspend(|| self.formatter.debug(&format!("[{}] {}", index, name)));
            }
            // The orchestrator logs every item error as an error line as well.
            RunEvent::ItemError { .. } => {}
            RunEvent::Finished {
                total_records,
                status,
                error_count,
            } => self.on_finished(&format!(
                "{}: {} records, {} errors",
                status, total_records, error_count
            )),
            RunEvent::Log { level, message } => self.print(level, &message),
        }
    }
}
