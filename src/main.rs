//! smi - cached npm installs
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use smi::cli::{Cli, Commands};
use smi::config::{Config, ConfigManager};
use smi::error::SmiResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> SmiResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.global.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.global.verbose, &config);
    debug!("Using config {}", config_manager.path().display());

    match cli.command {
        Commands::Install(args) => smi::cli::commands::install(args, &cli.global, &config).await,
        Commands::Relink(args) => smi::cli::commands::relink(args, &cli.global, &config).await,
        Commands::Info(args) => smi::cli::commands::info(args, &cli.global, &config).await,
        Commands::Cache(args) => smi::cli::commands::cache(args, &cli.global, &config).await,
        Commands::Config(args) => smi::cli::commands::config(args, &config_manager, &config).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("smi=warn"),
        1 => EnvFilter::new("smi=info"),
        _ => EnvFilter::new("smi=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
