use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument};

use super::{NoteEdit, Result, Vault, VaultError, VaultEvents};
use crate::note::NoteFile;

/// A vault backed by a directory on the local filesystem.
#[derive(Debug)]
pub struct FsVault {
    // Canonical path of the vault root
    root: PathBuf,
    config_dir: String,
    events: VaultEvents,
}

impl FsVault {
    /// Opens the directory at `path` as a vault.
    ///
    /// The host configuration directory does not have to exist yet; only the
    /// root does.
    pub async fn open(path: &Path, config_dir: impl Into<String>) -> Result<Self> {
        let meta = fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::NotADirectory(path.to_path_buf())
            } else {
                VaultError::Io(e)
            }
        })?;
        if !meta.is_dir() {
            return Err(VaultError::NotADirectory(path.to_path_buf()));
        }

        let root = fs::canonicalize(path).await?;
        debug!(root = %root.display(), "Opened vault");
        Ok(Self {
            root,
            config_dir: config_dir.into(),
            events: VaultEvents::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the host configuration directory.
    pub fn config_path(&self) -> PathBuf {
        self.root.join(&self.config_dir)
    }

    /// Resolves a path relative to the vault root into a note handle.
    pub fn note(&self, relative: impl AsRef<Path>) -> Result<NoteFile> {
        let path = self.root.join(relative.as_ref());
        if !self.contains(&path) {
            return Err(VaultError::OutsideVault(path));
        }
        NoteFile::from_path(path.clone()).ok_or(VaultError::NoteNotFound(path))
    }

    fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
            && !path.components().any(|c| matches!(c, Component::ParentDir))
    }

    async fn read_note(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => VaultError::NoteNotFound(path.to_path_buf()),
            std::io::ErrorKind::InvalidData => VaultError::NotText(path.to_path_buf()),
            _ => VaultError::Io(e),
        })
    }
}

#[async_trait]
impl Vault for FsVault {
    fn base_path(&self) -> Option<&Path> {
        Some(&self.root)
    }

    fn config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Reads the note, applies `edit`, then writes the result to a sibling
    /// temporary file and renames it over the note.
    #[instrument(skip(self, edit), fields(note = %note.path().display()))]
    async fn process(&self, note: &NoteFile, edit: NoteEdit) -> Result<String> {
        let path = note.path();
        if !self.contains(path) {
            return Err(VaultError::OutsideVault(path.to_path_buf()));
        }

        let current = self.read_note(path).await?;
        let updated = edit(&current);

        let tmp_path = temp_sibling(path);
        fs::write(&tmp_path, updated.as_bytes()).await?;
        if let Err(e) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(VaultError::Io(e));
        }
        debug!(bytes = updated.len(), "Note rewritten");
        Ok(updated)
    }

    fn events(&self) -> &VaultEvents {
        &self.events
    }
}

/// `dir/Note.md` -> `dir/.Note.md.quicknote-tmp`; hidden, so the watcher skips it.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".quicknote-tmp");
    path.with_file_name(name)
}
