//! Scrip - Go scripts without the ceremony
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use scrip::cli::{commands, Cli, Commands};
use scrip::config::ConfigManager;
use scrip::error::ScripResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Overrides the `-v` log level with a full filter directive
const ENV_LOG: &str = "SCRIP_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ScripResult<u8> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Commands::Completions { shell } = cli.command {
        commands::completions(shell)?;
        return Ok(0);
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load_with_env().await?;

    let verbosity = cli.verbose.max(u8::from(config.general.verbose));
    init_logging(verbosity);

    match cli.command {
        Commands::Completions { .. } => Ok(0),
        Commands::Run(args) => commands::run(args, &config).await.map(exit_status),
        Commands::Cache(args) => commands::cache(args, &config).await.map(|_| 0),
        Commands::Config(args) => commands::config(args, &config_manager, &config)
            .await
            .map(|_| 0),
    }
}

/// Initialize logging: 0 = warn, 1 = info, 2+ = debug. Logs go to stderr
/// so a script's stdout stays clean.
fn init_logging(verbosity: u8) {
    let filter = match std::env::var(ENV_LOG) {
        Ok(directive) if !directive.is_empty() => {
            EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("scrip=warn"))
        }
        _ => match verbosity {
            0 => EnvFilter::new("scrip=warn"),
            1 => EnvFilter::new("scrip=info"),
            _ => EnvFilter::new("scrip=debug"),
        },
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// Exit statuses outside 0..=255 cannot be passed on; report them as failure
fn exit_status(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
