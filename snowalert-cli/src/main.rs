//! Binary crate for the `snowalert` bot runner.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - A line-based console transport standing in for the chat platform

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod console;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("snowalert_core=info,snowalert=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
