pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod extract;
pub mod navigate;
pub mod orchestrator;
pub mod page;
pub mod persist;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, Commands, ExportArgs, InitConfigArgs, OutputFormat, RunArgs};
pub use config::{CliOverrides, Config};
pub use error::{HarvestError, Result, UserFriendlyError};

// Core functionality re-exports
pub use detect::{Container, ContainerKind, Detector, PageState};
pub use extract::{ListItem, Record, RecordBuilder};
pub use navigate::{Command, ControlHandle, Controls, NavigationController};
pub use orchestrator::{EventSink, Orchestrator, RunEvent, RunStatus, RunSummary};
pub use page::{ChromiumPage, Clock, FixtureSite, HostPage, ManualClock, NodePath, TokioClock};
pub use persist::{ExportFormat, Exporter, JsonSnapshotStore, SnapshotStore};
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, TerminalReporter};

use persist::{MemorySnapshotStore, RunSnapshot};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a `run` produced, for reporting and exit codes.
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub exported: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl RunReport {
    /// 0 clean, 2 finished with item errors, 130 cancelled, otherwise by failure.
    pub fn exit_code(&self) -> i32 {
        match self.summary.status {
            RunStatus::Completed if self.summary.error_count == 0 => 0,
            RunStatus::Completed => 2,
            RunStatus::Cancelled => 130,
            _ => self.summary.failure.as_ref().map(exit_code_for).unwrap_or(1),
        }
    }
}

pub fn exit_code_for(error: &HarvestError) -> i32 {
    match error {
        HarvestError::Cancelled => 130,
        HarvestError::NoItemsFound { .. } => 3,
        HarvestError::Browser { .. } | HarvestError::InvalidEndpoint { .. } => 4,
        _ => 1,
    }
}

/// Main library interface for sed-harvest
pub struct SedHarvest {
    config: Config,
    output_formatter: OutputFormatter,
    install_signals: bool,
}

impl SedHarvest {
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self {
            config,
            output_formatter: OutputFormatter::new(output_mode, verbose, quiet),
            install_signals: true,
        }
    }

    /// Same as [`SedHarvest::new`] without the Ctrl+C handler or the stdin reader.
    pub fn new_for_test(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        Self {
            install_signals: false,
            ..Self::new(config, output_mode, verbose, quiet)
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        Ok(Self::new(
            config,
            cli_args.output_format.into(),
            cli_args.verbosity_level(),
            cli_args.quiet,
        ))
    }

    /// Runs a whole extraction and exports what it captured.
    pub async fn run(&self, args: &RunArgs) -> Result<RunReport> {
        let started = Instant::now();
        let (handle, controls) = Controls::channel();
        self.output_formatter
            .print_header(&format!("sed-harvest {}: {}", env!("CARGO_PKG_VERSION"), args.period));

        let shutdown = if self.install_signals {
            let shutdown = GracefulShutdown::new(handle.clone())?;
            if std::io::stdin().is_terminal() {
                ui::spawn_stdin_commands(handle.clone());
                self.output_formatter
                    .info("Type p + Enter to pause, r to resume, s to stop");
            }
            shutdown
        } else {
            GracefulShutdown::disabled()
        };

        let summary = match &args.fixture {
            Some(dir) => {
                let clock: Arc<dyn Clock> = if args.real_time {
                    Arc::new(TokioClock::new())
                } else {
                    Arc::new(ManualClock::new())
                };
                let site = FixtureSite::from_dir(dir, clock.clone())?;
                self.output_formatter
                    .start_operation(&format!("Rehearsing against {}", site.describe()));
                self.drive(site, clock, controls, args).await?
            }
            None => {
                let endpoint = self.config.browser.endpoint.clone();
                self.output_formatter
                    .start_operation(&format!("Attaching to the browser at {}", endpoint));
                let page =
                    ChromiumPage::connect(&endpoint, self.config.browser.tab_url_hint.as_deref()).await?;
                self.output_formatter.debug(&page.describe());
                self.drive(page, Arc::new(TokioClock::new()), controls, args).await?
            }
        };

        if shutdown.is_requested() {
            self.output_formatter
                .warning("Stopped by Ctrl+C; the snapshot keeps everything captured so far");
        }

        let exported = if args.dry_run || summary.records.is_empty() {
            Vec::new()
        } else {
            self.exporter()
                .export(&summary.records, &args.period, today())?
        };

        let report = RunReport {
            summary,
            exported,
            elapsed: started.elapsed(),
        };
        self.output_formatter
            .print_run_summary(&report.summary, &report.exported, report.elapsed);
        Ok(report)
    }

    async fn drive<P: HostPage>(
        &self,
        page: P,
        clock: Arc<dyn Clock>,
        controls: Controls,
        args: &RunArgs,
    ) -> Result<RunSummary> {
        let reporter = Arc::new(TerminalReporter::new(self.output_formatter.clone(), true));
        let mut orchestrator = Orchestrator::new(page, clock, &self.config, reporter, controls)?;

        let store: Box<dyn SnapshotStore> = if args.dry_run {
            self.output_formatter
                .warning("Dry run: nothing will be written to disk");
            Box::new(MemorySnapshotStore::new())
        } else {
            Box::new(self.snapshot_store())
        };

        if args.keep_previous {
            if let Some(previous) = store.load()? {
                self.output_formatter.info(&format!(
                    "Continuing from {} saved records",
                    previous.records.len()
                ));
                orchestrator = orchestrator.with_state(previous);
            }
        }

        let mut orchestrator = orchestrator.with_store(store);
        orchestrator
            .start(&args.period, self.config.timing.inter_item_delay_ms)
            .await
    }

    /// Writes the saved snapshot's records using the configured format.
    pub fn export_snapshot(&self, period: Option<&str>) -> Result<Vec<PathBuf>> {
        let snapshot = self.load_snapshot()?;
        let label = period
            .map(str::to_string)
            .or_else(|| {
                snapshot
                    .records
                    .first()
                    .map(|record| record.value(extract::record::PERIOD_COLUMN).to_string())
            })
            .unwrap_or_default();

        let written = self.exporter().export(&snapshot.records, &label, today())?;
        for path in &written {
            self.output_formatter.success(&format!(
                "Wrote {} records to {}",
                snapshot.records.len(),
                path.display()
            ));
        }
        Ok(written)
    }

    pub fn clear_snapshot(&self) -> Result<()> {
        let store = self.snapshot_store();
        store.clear()?;
        self.output_formatter
            .success(&format!("Cleared {}", store.path().display()));
        Ok(())
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config()?;
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn handle_error(&self, error: &HarvestError) {
        self.output_formatter.print_user_friendly_error(error);
    }

    fn snapshot_store(&self) -> JsonSnapshotStore {
        JsonSnapshotStore::new(self.config.snapshot_path())
    }

    fn load_snapshot(&self) -> Result<RunSnapshot> {
        let store = self.snapshot_store();
        store.load()?.ok_or_else(|| HarvestError::Export {
            message: format!("No snapshot found at {}", store.path().display()),
        })
    }

    fn exporter(&self) -> Exporter {
        Exporter::new(self.config.output.directory.clone(), self.config.output.format)
            .with_quoting(self.config.output.csv_quoting)
    }
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn harvest_in(dir: &Path) -> SedHarvest {
        let mut config = Config::default();
        config.output.directory = dir.to_path_buf();
        SedHarvest::new_for_test(config, OutputMode::Plain, 0, true)
    }

    #[test]
    fn test_sample_config_generation() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("sample.toml");

        SedHarvest::generate_sample_config(&config_path).unwrap();
        let content = std::fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("[browser]"));
        assert!(content.contains("[timing]"));
        assert!(content.contains("[output]"));
    }

    #[test]
    fn test_export_without_snapshot_fails() {
        let temp_dir = TempDir::new().unwrap();
        let harvest = harvest_in(temp_dir.path());
        assert!(matches!(
            harvest.export_snapshot(None),
            Err(HarvestError::Export { .. })
        ));
    }

    #[test]
    fn test_export_uses_period_from_records() {
        let temp_dir = TempDir::new().unwrap();
        let harvest = harvest_in(temp_dir.path());

        let mut record = Record::new();
        record.set("série/ano", "6C");
        record.set("nome", "ANA");
        let snapshot = RunSnapshot {
            records: vec![record],
            error_count: 0,
            running: false,
            updated_at: None,
        };
        harvest.snapshot_store().save(&snapshot).unwrap();

        let written = harvest.export_snapshot(None).unwrap();
        assert_eq!(written, vec![temp_dir.path().join("6C.csv")]);

        harvest.clear_snapshot().unwrap();
        assert!(harvest.export_snapshot(None).is_err());
    }

    #[test]
    fn test_exit_codes() {
        let report = |status, error_count, failure| RunReport {
            summary: RunSummary {
                status,
                records: Vec::new(),
                error_count,
                pages: 1,
                failure,
            },
            exported: Vec::new(),
            elapsed: Duration::ZERO,
        };

        assert_eq!(report(RunStatus::Completed, 0, None).exit_code(), 0);
        assert_eq!(report(RunStatus::Completed, 1, None).exit_code(), 2);
        assert_eq!(report(RunStatus::Cancelled, 0, None).exit_code(), 130);
        assert_eq!(
            report(RunStatus::Failed, 0, Some(HarvestError::NoItemsFound { page: 1 })).exit_code(),
            3
        );
        assert_eq!(
            report(RunStatus::Failed, 0, Some(HarvestError::Browser { message: "x".into() })).exit_code(),
            4
        );
    }
}
