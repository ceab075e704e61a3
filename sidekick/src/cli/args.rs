//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Sidekick - work-item aware assistant backend
#[derive(Parser, Debug)]
#[command(name = "sidekick")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to <config dir>/sidekick/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP/WebSocket server for an assistant panel
    Serve {
        /// Port to listen on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask a question and stream the answer to stdout
    Ask {
        /// Work item to load as context
        #[arg(short, long)]
        work_item: Option<u64>,

        /// Wait for the full answer instead of streaming
        #[arg(long)]
        buffered: bool,

        /// Answer language (overrides chat.language)
        #[arg(short, long)]
        language: Option<String>,

        /// The question
        #[arg(trailing_var_arg = true, required = true)]
        prompt: Vec<String>,
    },

    /// Print the context prompt built for a work item
    Context {
        /// Work item id
        id: u64,

        /// Prompt language (overrides chat.language)
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Show the effective configuration with secrets masked
    Config,
}
