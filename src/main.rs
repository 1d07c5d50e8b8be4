#![forbid(unsafe_code)]

//! qtel — query telemetry CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    init_tracing(args.verbose);
    if let Err(e) = cli_app::run(&args) {
        eprintln!("qtel: {e}");
        std::process::exit(e.exit_code());
    }
}

/// Diagnostics go to stderr; stdout carries command output only.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
