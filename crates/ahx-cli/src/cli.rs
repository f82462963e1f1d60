use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ahx",
    about = "Asset history diff: compare revisions of structured assets",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Configuration file (defaults to ahx.toml in the repository root)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compare two snapshot files
    Diff(DiffArgs),
    /// List the revisions of an object and the pairs they form
    History(HistoryArgs),
    /// Compare a revision of an object with its predecessor
    Compare(CompareArgs),
}

#[derive(Args)]
pub struct DiffArgs {
    /// Older snapshot (JSON object)
    pub old: PathBuf,
    /// Newer snapshot (JSON object)
    pub new: PathBuf,
}

#[derive(Args)]
pub struct HistoryArgs {
    /// History repository root
    pub root: PathBuf,
    /// Object path under the root
    pub object: String,
    /// Re-read the history after the first query
    #[arg(long)]
    pub refresh: bool,
}

#[derive(Args)]
pub struct CompareArgs {
    /// History repository root
    pub root: PathBuf,
    /// Object path under the root
    pub object: String,
    /// Revision to inspect; HEAD for the working copy
    pub candidate: String,
    /// Step through every difference after printing the tree
    #[arg(long)]
    pub walk: bool,
}
