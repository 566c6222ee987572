use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{FsVault, Vault};
use crate::note::{NoteCreated, NoteFile};

/// Rescan interval when polling, either on request or because native
/// notifications are unavailable.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const EVENT_BUFFER: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchMode {
    Native,
    Poll(Duration),
}

/// Turns file-system notifications for an [`FsVault`] into [`NoteCreated`]
/// events.
///
/// Only files created after [`spawn`](Self::spawn) returns are reported, each
/// one once. Hidden entries and the host configuration directory are skipped.
#[derive(Debug)]
pub struct NoteWatcher {
    root: PathBuf,
    config_dir: PathBuf,
    mode: WatchMode,
}

impl NoteWatcher {
    /// Uses the platform's native notification backend.
    pub fn new(vault: &FsVault) -> Self {
        Self {
            root: vault.root().to_path_buf(),
            config_dir: vault.config_path(),
            mode: WatchMode::Native,
        }
    }

    /// Rescans the vault every `interval` instead of relying on native
    /// notifications, e.g. for network drives.
    pub fn polling(mut self, interval: Duration) -> Self {
        self.mode = WatchMode::Poll(interval);
        self
    }

    /// Starts watching and dispatches a [`NoteCreated`] per new file until
    /// `cancel` fires. If native watching cannot be set up, falls back to
    /// polling.
    pub fn spawn(self, vault: Arc<FsVault>, cancel: CancellationToken) -> notify::Result<JoinHandle<()>> {
        let (event_tx, mut event_rx) = mpsc::channel(EVENT_BUFFER);
        let watcher = match self.mode {
            WatchMode::Native => self.watch_native(&event_tx).or_else(|e| {
                warn!(error = %e, "Native file watching unavailable, polling instead");
                self.watch_polling(&event_tx, DEFAULT_POLL_INTERVAL)
            })?,
            WatchMode::Poll(interval) => self.watch_polling(&event_tx, interval)?,
        };
        drop(event_tx);
        info!(root = %self.root.display(), mode = ?self.mode, "Watching vault for new notes");

        Ok(tokio::spawn(async move {
            // Dropping the watcher unregisters it
            let _watcher = watcher;
            let mut reported = HashSet::new();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = event_rx.recv() => match event {
                        Some(Ok(event)) => self.handle_event(&vault, event, &mut reported).await,
                        Some(Err(e)) => warn!(error = %e, "Watch error"),
                        None => break,
                    }
                }
            }
            debug!("Note watcher stopped");
        }))
    }

    fn watch_native(&self, events: &EventSender) -> notify::Result<Box<dyn Watcher + Send>> {
        let mut watcher = RecommendedWatcher::new(forward_to(events), Config::default())?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        Ok(Box::new(watcher))
    }

    fn watch_polling(&self, events: &EventSender, interval: Duration) -> notify::Result<Box<dyn Watcher + Send>> {
        let config = Config::default().with_poll_interval(interval);
        let mut watcher = PollWatcher::new(forward_to(events), config)?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        Ok(Box::new(watcher))
    }

    async fn handle_event(&self, vault: &FsVault, event: Event, reported: &mut HashSet<PathBuf>) {
        match event.kind {
            EventKind::Create(_) => {}
            EventKind::Remove(_) => {
                // A note deleted and created again counts as new
                for path in &event.paths {
                    reported.remove(path);
                }
                return;
            }
            kind => {
                trace!(?kind, "Ignoring event");
                return;
            }
        }

        for path in event.paths {
            if self.is_ignored(&path) || reported.contains(&path) {
                continue;
            }
            // Folders, and files that are already gone again
            if !fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
                continue;
            }
            let Some(file) = NoteFile::from_path(path.clone()) else {
                continue;
            };
            reported.insert(path);
            debug!(note = %file.path().display(), "New file detected");
            vault.events().note_created.dispatch(&mut NoteCreated { file });
        }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return true;
        };
        let hidden = relative
            .components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with('.'));
        hidden || path.starts_with(&self.config_dir)
    }
}

type EventSender = mpsc::Sender<notify::Result<Event>>;

fn forward_to(events: &EventSender) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    let events = events.clone();
    move |res| {
        let _ = events.blocking_send(res);
    }
}
