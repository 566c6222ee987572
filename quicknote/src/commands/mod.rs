use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::{Term, style};
use quicknote_core::vault::{NoteWatcher, Notifier};
use quicknote_extensions::plugin::python::backend::{
    DependencyProbe, DependencyStatus, InterpreterPath, InterpreterResolver, ProcessLauncher, TokioLauncher,
};
use quicknote_extensions::quicknote::{ActivePlugin, PluginConfig, QuickNotePlugin, SkipReason};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::AppContext;
use crate::cli::{RunArgs, SummarizeArgs};
use crate::notifier::ConsoleNotifier;

async fn activate(cx: &AppContext, config: PluginConfig) -> Result<ActivePlugin> {
    let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);
    QuickNotePlugin::new()
        .activate(cx.vault.clone(), notifier, config)
        .await
        .context("QuickNote could not be activated")
}

pub async fn handle_run(args: RunArgs, cx: AppContext) -> Result<()> {
    let mut config = cx.config.clone();
    if let Some(mode) = args.insert_mode {
        config.insert_mode = mode;
    }
    let active = activate(&cx, config).await?;

    println!(
        "{} watching {} (Ctrl-C to stop)",
        style("QuickNote").green().bold(),
        cx.vault.root().display()
    );

    let cancel = CancellationToken::new();
    let mut watcher = NoteWatcher::new(&cx.vault);
    if let Some(interval) = args.poll_interval_ms {
        watcher = watcher.polling(Duration::from_millis(interval));
    }
    let watching = watcher
        .spawn(cx.vault.clone(), cancel.clone())
        .context("Failed to watch the vault")?;

    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Shutting down");
    cancel.cancel();
    watching.await.context("Note watcher panicked")?;
    active.deactivate();
    Ok(())
}

pub async fn handle_summarize(args: SummarizeArgs, cx: AppContext) -> Result<()> {
    let active = activate(&cx, cx.config.clone()).await?;
    let handler = active.handler();

    let keyword = match handler.keyword_for(&args.title) {
        Ok(keyword) => keyword,
        Err(reason) => {
            let why = match reason {
                SkipReason::DefaultName => "it still has the default note name",
                SkipReason::NotMarkdown => "it is not a note",
            };
            warn!(title = %args.title, ?reason, "Not summarizing");
            println!("Skipped '{}': {why}.", args.title);
            return Ok(());
        }
    };

    let summary = handler
        .client()
        .fetch_summary(keyword)
        .await
        .with_context(|| format!("Failed to fetch a summary for '{keyword}'"))?;
    active.deactivate();

    let width = Term::stdout()
        .size_checked()
        .map(|(_, cols)| usize::from(cols))
        .unwrap_or(80)
        .clamp(20, 100);
    println!("{}", style(&args.title).bold());
    for line in textwrap::wrap(&summary, width) {
        println!("{line}");
    }
    Ok(())
}

pub async fn handle_doctor(cx: AppContext) -> Result<()> {
    let config = &cx.config;
    let launcher: Arc<dyn ProcessLauncher> = Arc::new(TokioLauncher);
    let mut problems = 0;

    row("Vault", cx.vault.root().display());
    row("Plugin directory", cx.plugin_dir.display());

    let entry_point = config.server_options(&cx.plugin_dir).entry_point_path();
    if entry_point.exists() {
        row("Backend entry point", entry_point.display());
    } else {
        problems += 1;
        row("Backend entry point", style(format!("missing ({})", entry_point.display())).red());
    }

    let interpreter = match &config.interpreter {
        Some(path) => InterpreterPath::Configured(path.clone()),
        None => InterpreterResolver::new(launcher.clone()).resolve().await,
    };
    let interpreter_label = match &interpreter {
        InterpreterPath::Located(_) => format!("{interpreter}"),
        InterpreterPath::Configured(_) => format!("{interpreter} (configured)"),
        InterpreterPath::Fallback => format!("{interpreter} (not located, relying on PATH)"),
    };
    row("Python interpreter", interpreter_label);

    let probe = DependencyProbe::new(launcher).with_modules(config.required_modules.clone());
    let probe_dir = if cx.plugin_dir.is_dir() { cx.plugin_dir.as_path() } else { cx.vault.root() };
    let dependencies = match probe.check(&interpreter, probe_dir).await {
        DependencyStatus::Satisfied => style(probe.import_directive()).green(),
        DependencyStatus::Missing => {
            problems += 1;
            style(format!("missing ({})", probe.modules().join(", "))).red()
        }
        DependencyStatus::Indeterminate => style("could not run the interpreter".to_string()).yellow(),
    };
    row("Dependencies", dependencies);

    row("Backend URL", &config.server.base_url);
    row("Model", &config.server.model);
    row("Insert mode", config.insert_mode);
    row("Startup timeout", match config.startup_timeout() {
        Some(timeout) => format!("{}s", timeout.as_secs()),
        None => "none".to_string(),
    });

    if problems > 0 {
        anyhow::bail!("{problems} problem(s) found");
    }
    println!("{}", style("Everything looks ready.").green());
    Ok(())
}

fn row(label: &str, value: impl std::fmt::Display) {
    println!("{:>20}  {value}", style(label).dim());
}
