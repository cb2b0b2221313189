use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)] // requires `derive` feature
#[command(name = "stream-cache")]
#[command(
    about = "Keeps actively streamed media on the cache tier",
    long_about = None
)]
pub struct Cli {
    /// Configuration file (any format the config crate understands)
    #[arg(short, long, global = true, default_value = "Config")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the polling daemon
    Daemon,
    /// Move every tracked file back to bulk storage
    MoveTracked(BatchArgs),
    /// Move every untracked cache file back to bulk storage
    MoveOther(BatchArgs),
    /// Move every cache file back to bulk storage and reset the ledger
    MoveAll(BatchArgs),
    /// List tracked files and how long they have been cached
    Status,
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, clap::Args)]
pub struct BatchArgs {
    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}
