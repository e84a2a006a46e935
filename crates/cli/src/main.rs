//! Offline inspection of campaign device stores.
//!
//! Run with: `campaign-tool <command> <JOURNAL> ...`, where `JOURNAL` is a
//! runtime data directory or the journal file inside it.

mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Actions, Chain, Hash, Replay};

/// Inspect campaign journals, deck chains and content hashes
#[derive(Parser)]
#[command(name = "campaign-tool")]
#[command(about = "Inspection tools for campaign device stores", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Summarize or dump the journaled store actions
    Actions(Actions),

    /// List campaigns, or replay one campaign's guide log
    Replay(Replay),

    /// Print the version chain containing a deck
    Chain(Chain),

    /// Compute the content hash of a deck file
    Hash(Hash),
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Actions(cmd) => cmd.execute(),
        Command::Replay(cmd) => cmd.execute(),
        Command::Chain(cmd) => cmd.execute(),
        Command::Hash(cmd) => cmd.execute(),
    }
}
