//! The QuickNote plugin: starts the summary backend when activated and fills
//! every newly created note with a definition of its title.
//!
//! Activation order matters. The note listener is registered only after the
//! backend has reported readiness, so no summary request is ever sent to a
//! backend that was never up. If startup fails, activation fails and no notes
//! are processed.

pub mod config;
pub mod ingest;
pub mod notices;

pub use config::{ConfigError, InsertMode, PluginConfig};
pub use ingest::{IngestError, IngestOutcome, NoteIngestHandler, SkipReason};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quicknote_core::event::Listener;
use quicknote_core::note::NoteCreated;
use quicknote_core::vault::{Notifier, Vault};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::plugin::python::backend::{
    DependencyProbe, DependencyStatus, ProbeAdvice, ProcessLauncher, Readiness, ServerError, ServerState,
    ServerSupervisor, TokioLauncher,
};
use crate::summary::{SummaryClient, SummaryError};

#[derive(Error, Debug)]
pub enum ActivationError {
    #[error("Cannot determine vault path")]
    WorkspacePathUnavailable,

    #[error("Backend failed to start: {0}")]
    Startup(#[from] ServerError),

    #[error(transparent)]
    Endpoint(#[from] SummaryError),
}

/// Entry point for activating the plugin inside a host.
#[derive(Clone)]
pub struct QuickNotePlugin {
    launcher: Arc<dyn ProcessLauncher>,
}

impl Default for QuickNotePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl QuickNotePlugin {
    pub fn new() -> Self {
        Self::with_launcher(Arc::new(TokioLauncher))
    }

    pub fn with_launcher(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self { launcher }
    }

    /// Starts the backend and subscribes to note creation in `vault`.
    #[instrument(skip_all, fields(plugin = %config.plugin_id))]
    pub async fn activate(
        &self,
        vault: Arc<dyn Vault>,
        notifier: Arc<dyn Notifier>,
        config: PluginConfig,
    ) -> Result<ActivePlugin, ActivationError> {
        let Some(vault_root) = vault.base_path().map(Path::to_path_buf) else {
            error!("Vault has no base path on disk");
            notifier.notice(notices::VAULT_PATH_UNKNOWN);
            return Err(ActivationError::WorkspacePathUnavailable);
        };
        let plugin_dir = config.plugin_dir(&vault_root, vault.config_dir());
        debug!(plugin_dir = %plugin_dir.display(), "Activating");

        let client = SummaryClient::new(config.summary_config()?, None)?;
        let supervisor = ServerSupervisor::new(config.server_options(&plugin_dir), self.launcher.clone());

        let interpreter = supervisor.interpreter().await;
        let probe = DependencyProbe::new(self.launcher.clone()).with_modules(config.required_modules.clone());
        let dependencies = probe.check(&interpreter, &plugin_dir).await;
        match config.indeterminate_policy.advise(dependencies) {
            ProbeAdvice::None => {}
            ProbeAdvice::CouldNotVerify => notifier.notice(&notices::dependencies_unverified(probe.modules())),
            ProbeAdvice::Missing => notifier.notice(&notices::dependencies_missing(probe.modules())),
        }

        let readiness = match supervisor.start().await {
            Ok(readiness) => readiness,
            Err(e) => {
                error!(error = %e, "Backend failed to start, note listener not registered");
                notifier.notice(&notices::backend_failed(&e));
                supervisor.stop();
                return Err(ActivationError::Startup(e));
            }
        };

        let handler = Arc::new(NoteIngestHandler::new(
            client,
            vault.clone(),
            notifier,
            config.default_name_sentinel.clone(),
            config.insert_mode,
        ));
        let runtime = tokio::runtime::Handle::current();
        let tasks = CancellationToken::new();
        let listener_handler = handler.clone();
        let listener_tasks = tasks.clone();
        let listener = Listener::new(&vault.events().note_created, move |event: &NoteCreated| {
            let handler = listener_handler.clone();
            let cancelled = listener_tasks.clone();
            let file = event.file.clone();
            runtime.spawn(async move {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => {
                        debug!(note = %file.path().display(), "Plugin deactivated, note left unchanged");
                    }
                    _ = handler.handle(&file) => {}
                }
            });
        });

        info!(%interpreter, ?readiness, "QuickNote active");
        Ok(ActivePlugin {
            plugin_dir,
            dependencies,
            readiness,
            supervisor,
            handler,
            listener: Some(listener),
            tasks,
        })
    }
}

/// A running plugin. Dropping it (or calling [`deactivate`](Self::deactivate))
/// unsubscribes from the vault, abandons notes still being handled and
/// terminates the backend.
pub struct ActivePlugin {
    plugin_dir: PathBuf,
    dependencies: DependencyStatus,
    readiness: Readiness,
    supervisor: ServerSupervisor,
    handler: Arc<NoteIngestHandler>,
    listener: Option<Listener<NoteCreated>>,
    // Cancels note handlers still in flight
    tasks: CancellationToken,
}

impl ActivePlugin {
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    pub fn dependencies(&self) -> DependencyStatus {
        self.dependencies
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub fn server_state(&self) -> ServerState {
        self.supervisor.state()
    }

    pub fn handler(&self) -> &NoteIngestHandler {
        &self.handler
    }

    pub fn deactivate(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.listener.take().is_some() {
            self.tasks.cancel();
            self.supervisor.stop();
            info!("QuickNote deactivated");
        }
    }
}

impl Drop for ActivePlugin {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ActivePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivePlugin")
            .field("plugin_dir", &self.plugin_dir)
            .field("dependencies", &self.dependencies)
            .field("readiness", &self.readiness)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}
