use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "turbosort")]
#[command(about = "Directory watcher and file sorter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Watch the source tree and sort files to their destinations (default)
    Run,
    /// Display copy history
    History(HistoryArgs),
    /// Display copy statistics
    Stats,
    /// Clear the copy history ledger
    ClearHistory,
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Show detailed per-file records
    #[arg(long)]
    pub detailed: bool,
}
