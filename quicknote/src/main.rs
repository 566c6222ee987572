use anyhow::Result;
use clap::Parser;
use quicknote::cli::{Cli, Commands};
use quicknote::{AppContext, commands};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let cx = AppContext::load(&cli).await?;
    match cli.command {
        Commands::Run(args) => commands::handle_run(args, cx).await?,
        Commands::Summarize(args) => commands::handle_summarize(args, cx).await?,
        Commands::Doctor => commands::handle_doctor(cx).await?,
    }

    Ok(())
}

/// `-v` raises the level from `warn`, `--quiet` forces `error`, `RUST_LOG` wins over both.
fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
}
