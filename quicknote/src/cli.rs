use clap::{Args, Parser, Subcommand};
use quicknote_core::vault::DEFAULT_CONFIG_DIR;
use quicknote_extensions::quicknote::InsertMode;
use std::path::PathBuf;

/// QuickNote: fill newly created notes with a definition from a local model.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault directory.
    #[arg(long, global = true, env = "QUICKNOTE_VAULT", default_value = ".")]
    pub vault: PathBuf,

    /// Name of the host configuration directory inside the vault.
    #[arg(long, global = true, env = "QUICKNOTE_CONFIG_DIR", default_value = DEFAULT_CONFIG_DIR)]
    pub config_dir: String,

    /// Python interpreter for the backend. Skips auto-detection.
    #[arg(long, global = true, env = "QUICKNOTE_PYTHON")]
    pub python: Option<PathBuf>,

    /// Base URL of the summary backend.
    #[arg(long, global = true, env = "QUICKNOTE_BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Model identifier sent with each summary request.
    #[arg(long, global = true, env = "QUICKNOTE_MODEL")]
    pub model: Option<String>,

    /// Seconds to wait for the backend to become ready (0 waits forever).
    #[arg(long, global = true, env = "QUICKNOTE_STARTUP_TIMEOUT")]
    pub startup_timeout: Option<u64>,

    /// Increase verbosity (use multiple times for more).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the backend and summarize every note created in the vault until Ctrl-C.
    Run(RunArgs),
    /// Start the backend, print one summary, and exit.
    Summarize(SummarizeArgs),
    /// Report interpreter, dependencies and plugin layout without starting anything.
    Doctor,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Poll the vault every N milliseconds instead of using native file
    /// notifications (useful on network drives).
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Where the summary goes: replace, prepend or append.
    #[arg(long)]
    pub insert_mode: Option<InsertMode>,
}

#[derive(Args, Debug)]
pub struct SummarizeArgs {
    /// Note title to summarize.
    #[arg(required = true)]
    pub title: String,
}
