use crate::config::{CliOverrides, Config};
use crate::error::Result;
use crate::persist::ExportFormat;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "sed-harvest")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Extract student records from the SED class list")]
#[command(
    long_about = "sed-harvest attaches to an already authenticated browser tab showing the SED \
                  class list, opens every student's detail window in turn, reads its sections \
                  and writes the result as CSV or JSON."
)]
#[command(before_help = "📋 sed-harvest - SED student list extraction")]
#[command(after_help = "EXAMPLES:\n  \
    sed-harvest run --browser http://127.0.0.1:9222 --period \"7A\"\n  \
    sed-harvest run --browser http://127.0.0.1:9222 --period 9B --delay 3000 --format both\n  \
    sed-harvest run --fixture ./rehearsal --period 7A --dry-run\n  \
    sed-harvest export --format json\n  \
    sed-harvest init-config sed-harvest.toml\n\n\
    While a run is going, type p (pause), r (resume) or s (stop) and press Enter.")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Walk the class list and extract every student
    Run(RunArgs),
    /// Write the records of the saved snapshot to CSV/JSON
    Export(ExportArgs),
    /// Delete the saved snapshot
    Clear,
    /// Generate a sample configuration file
    InitConfig(InitConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// DevTools endpoint of the browser holding the SED session
    #[arg(
        long,
        value_parser = validate_endpoint,
        conflicts_with = "fixture",
        required_unless_present = "fixture"
    )]
    pub browser: Option<String>,

    /// Directory of HTML states to rehearse against instead of a browser
    #[arg(long)]
    pub fixture: Option<PathBuf>,

    /// Period label (série/ano) stamped on every record and used as file name
    #[arg(short, long)]
    pub period: String,

    /// Delay between steps, in milliseconds; every other wait derives from it
    #[arg(short, long)]
    pub delay: Option<u64>,

    /// How long to wait for a detail window, in milliseconds
    #[arg(long)]
    pub detail_timeout: Option<u64>,

    /// Output directory for the snapshot and exports
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Export format
    #[arg(short, long, value_enum)]
    pub format: Option<ExportFormat>,

    /// Attach to the tab whose URL contains this text
    #[arg(long)]
    pub tab: Option<String>,

    /// Continue from the saved snapshot instead of starting empty
    #[arg(long)]
    pub keep_previous: bool,

    /// Walk the list without writing the snapshot or any export
    #[arg(long)]
    pub dry_run: bool,

    /// Let fixture transitions take real time instead of virtual time
    #[arg(long, conflicts_with = "browser")]
    pub real_time: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Period label used for the file name (defaults to the one in the records)
    #[arg(short, long)]
    pub period: Option<String>,

    /// Output directory holding the snapshot, where exports are written
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Export format
    #[arg(short, long, value_enum)]
    pub format: Option<ExportFormat>,
}

#[derive(Args, Debug, Clone)]
pub struct InitConfigArgs {
    /// Where to write the sample configuration
    #[arg(default_value = "sed-harvest.toml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON lines
    Json,
    /// Plain text output
    Plain,
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        match &self.command {
            Commands::Run(args) => CliOverrides::new()
                .with_endpoint(args.browser.clone())
                .with_tab_url_hint(args.tab.clone())
                .with_inter_item_delay(args.delay)
                .with_detail_timeout(args.detail_timeout)
                .with_output_dir(args.output.clone())
                .with_format(args.format),
            Commands::Export(args) => CliOverrides::new()
                .with_output_dir(args.output.clone())
                .with_format(args.format),
            Commands::Clear | Commands::InitConfig(_) => CliOverrides::new(),
        }
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}

/// Accepts DevTools endpoints: `http(s)://host:port` or a `ws(s)://` debugger URL.
pub fn validate_endpoint(s: &str) -> std::result::Result<String, String> {
    let url = Url::parse(s)
        .map_err(|_| "Invalid endpoint. Use e.g. http://127.0.0.1:9222".to_string())?;

    match url.scheme() {
        "http" | "https" | "ws" | "wss" => {}
        other => {
            return Err(format!(
                "Unsupported scheme '{}': the DevTools endpoint must use http, https, ws or wss",
                other
            ))
        }
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err("The endpoint must include a host".to_string());
    }

    Ok(s.to_string())
}
