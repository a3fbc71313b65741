mod cli;
mod commands;
mod error;
mod output;

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::output::Envelope;

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let started = Instant::now();
    let outcome = commands::run(&cli);
    let envelope = Envelope::new(&outcome, started.elapsed());

    if let Err(error) = output::render(&envelope, cli.pretty) {
        eprintln!("error: {error}");
        return ExitCode::from(error.exit_code());
    }

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

/// Logs go to stderr so stdout carries only the JSON envelope.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("MDM_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
