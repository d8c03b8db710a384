//! storysaver-rs — archives ephemeral story posts before they expire.
//!
//! Each run logs in to the story service, fetches the current stories of
//! every listed account, writes them under `stories/<account>/` with the
//! posting minute encoded in the filename, stamps the posting time into
//! file metadata, and mirrors the new files to remote storage. A `repair`
//! command re-derives timestamps from filenames for archives whose
//! metadata was lost in transit.

#![warn(clippy::all)]

mod archive;
mod cli;
mod config;
mod error;
mod remote;
mod report;
mod story;
mod sync;
mod timestamp;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, LogLevel};

#[tokio::main]
async fn main() -> ExitCode {
    // .env files are optional; a missing one is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let filter = match cli.log_level {
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::from(error::EXIT_UNEXPECTED);
        }
    };

    let result = match cli.effective_command() {
        Command::Sync(args) => sync::run_sync(&config, args.backend).await,
        Command::Repair(args) => run_repair(&config, &args.root),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            let code = error::exit_code(&e);
            if let Some(url) = &config.error_report_url {
                report::send_failure_report(url, &e, code).await;
            }
            ExitCode::from(code)
        }
    }
}

fn run_repair(config: &config::Config, root: &Path) -> anyhow::Result<()> {
    let codec = timestamp::StemCodec::new(config.timezone);
    let summary = archive::repair_archive(root, &codec)?;
    tracing::info!(
        repaired = summary.repaired,
        skipped = summary.skipped,
        "Repair complete"
    );
    Ok(())
}
