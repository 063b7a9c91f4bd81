use anyhow::{bail, Context};
use clap::Parser;
use sed_harvest::{
    exit_code_for, Cli, Commands, ExportArgs, HarvestError, InitConfigArgs, OutputFormatter,
    OutputMode, SedHarvest,
};
use std::process;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    // Handle special commands first
    if let Commands::InitConfig(args) = &cli.command {
        return handle_init_config(args);
    }

    let harvest = match SedHarvest::from_cli(&cli) {
        Ok(harvest) => harvest,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for(&e);
        }
    };

    match &cli.command {
        Commands::Run(args) => match harvest.run(args).await {
            Ok(report) => report.exit_code(),
            Err(e) => {
                harvest.handle_error(&e);
                exit_code_for(&e)
            }
        },
        Commands::Export(args) => handle_export(&harvest, args),
        Commands::Clear => match harvest.clear_snapshot() {
            Ok(()) => 0,
            Err(e) => {
                harvest.handle_error(&e);
                1
            }
        },
        Commands::InitConfig(_) => 0,
    }
}

fn handle_export(harvest: &SedHarvest, args: &ExportArgs) -> i32 {
    match harvest.export_snapshot(args.period.as_deref()) {
        Ok(_) => 0,
        Err(e) => {
            harvest.handle_error(&e);
            exit_code_for(&e)
        }
    }
}

fn handle_init_config(args: &InitConfigArgs) -> i32 {
    match write_sample_config(args) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", args.path.display());
            println!("\nTo use this configuration:");
            println!("  sed-harvest --config {} run --period 7A", args.path.display());
            println!("\nEdit the selectors and timings to match your SED pages.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {:#}", e);
            1
        }
    }
}

fn write_sample_config(args: &InitConfigArgs) -> anyhow::Result<()> {
    if args.path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", args.path.display());
    }
    SedHarvest::generate_sample_config(&args.path)
        .with_context(|| format!("writing {}", args.path.display()))
}

fn print_startup_error(error: &HarvestError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}
