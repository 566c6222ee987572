//! Contracts between QuickNote and the note-editing host it runs inside.
//!
//! The host owns the notes, the UI and the event loop. A plugin only sees:
//!
//! *   **[`Vault`]:** the workspace. It knows its base path on disk (if it has
//!     one), the name of the host's configuration directory, how to rewrite a
//!     note's content, and which listeners to notify when a note is created.
//! *   **[`Notifier`]:** transient one-line notices shown to the user.
//! *   **[`NoteCreated`](crate::note::NoteCreated):** the event dispatched through
//!     [`VaultEvents::note_created`] whenever a new file appears.
//!
//! [`FsVault`] implements [`Vault`] over a plain directory and [`NoteWatcher`]
//! produces `NoteCreated` events for it from file-system notifications, which
//! is enough to run the plugin outside of the real host.

pub use self::directory::FsVault;
pub use self::watcher::NoteWatcher;

mod directory;
mod watcher;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::event::define_event_listeners;
use crate::note::{NoteCreated, NoteFile};

/// Name of the host's configuration directory inside a vault.
pub const DEFAULT_CONFIG_DIR: &str = ".obsidian";

define_event_listeners!{ VaultEvents {
    note_created: NoteCreated,
}}

/// Produces a note's new content from its current content.
pub type NoteEdit = Box<dyn FnOnce(&str) -> String + Send>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Note not found: {0}")]
    NoteNotFound(PathBuf),

    #[error("Path is outside the vault: {0}")]
    OutsideVault(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Note is not valid UTF-8: {0}")]
    NotText(PathBuf),

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;

/// The host workspace as seen by a plugin.
#[async_trait]
pub trait Vault: Send + Sync {
    /// Absolute path of the vault root, or `None` when the host does not store
    /// the vault on the local filesystem.
    fn base_path(&self) -> Option<&Path>;

    /// Name of the host configuration directory inside the vault root.
    fn config_dir(&self) -> &str;

    /// Atomically replaces a note's content with `edit(current)`.
    async fn process(&self, note: &NoteFile, edit: NoteEdit) -> Result<String>;

    /// Listener lists for vault events.
    fn events(&self) -> &VaultEvents;
}

/// Shows transient notices to the user.
pub trait Notifier: Send + Sync {
    fn notice(&self, message: &str);
}
