//! Sidekick - work-item aware assistant backend.
//!
//! Architecture:
//! - `ask` and `context` run in-process and exit
//! - `serve` exposes the same orchestrator over HTTP and WebSocket
//! - Logs go to stderr so streamed answers on stdout stay clean

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    execute(cli).await
}
