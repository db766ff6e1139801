//! ltc - compile cache and device inspection CLI
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use ltc_client::cli::{Cli, Commands};
use ltc_client::config::ConfigManager;
use ltc_client::error::ClientResult;
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

async fn run() -> ClientResult<()> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    let mut config = config_manager.load().await?;
    if let Some(dir) = cli.cache_dir.clone() {
        config.cache.dir = Some(dir);
    }

    // 0 = warn, 1 = info, 2+ = debug
    let level = match (cli.verbose, config.general.verbose) {
        (0, false) => "warn",
        (0, true) | (1, _) => "info",
        _ => "debug",
    };
    let filter = EnvFilter::new(format!("ltc_client={level},ltc={level}"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if config.general.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.without_time().init();
    }

    debug!("Using config at {}", config_manager.path().display());

    match cli.command {
        Commands::Devices(args) => ltc_client::cli::commands::devices(args, &config).await,
        Commands::Cache(args) => ltc_client::cli::commands::cache(args, &config).await,
        Commands::Config(args) => {
            ltc_client::cli::commands::config(args, &config, &config_manager).await
        }
    }
}
