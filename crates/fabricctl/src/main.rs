mod cli;
mod commands;
mod config;
mod error;
mod files;
mod output;
mod patterns;
mod progress;
mod prompt;

use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Screen log from -v / RUST_LOG, optional file log at its own level
    let guard = match init_tracing(
        cli.global.verbose,
        cli.global.log_file.as_deref(),
        &cli.global.log_file_level,
    ) {
        Ok(guard) => guard,
        Err(err) => exit_with(err),
    };

    // Dispatch and handle errors with proper exit codes
    tracing::debug!(command = ?cli.command, "dispatching command");
    if let Err(err) = commands::dispatch(cli.command, &cli.global).await {
        drop(guard);
        exit_with(err);
    }
}

fn exit_with(err: CliError) -> ! {
    let code = err.exit_code();
    eprintln!("{:?}", miette::Report::new(err));
    std::process::exit(code);
}

fn init_tracing(
    verbosity: u8,
    log_file: Option<&Path>,
    file_level: &str,
) -> Result<Option<WorkerGuard>, CliError> {
    let screen_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let screen = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(screen_level)),
        );

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let filter = EnvFilter::try_new(file_level).map_err(|e| {
                CliError::validation("log-file-level", format!("'{file_level}': {e}"))
            })?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(screen)
        .with(file_layer)
        .init();
    Ok(guard)
}
