//! Binary crate for the `skycast` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Wiring the core to stdout, the file store and fixed coordinates

use clap::Parser;
use skycast_core::Config;

mod bridge;
mod cli;

/// `RUST_LOG` wins; otherwise the configured debug flag picks the level.
fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback)),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    let config = Config::load()?;
    init_tracing(config.service.debug);
    tracing::debug!(command = ?cmd.command, "starting");
    cmd.run(config).await
}
