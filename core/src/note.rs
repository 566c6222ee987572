use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::event::Event;

/// Extension of the notes QuickNote reacts to.
pub const MARKDOWN_EXTENSION: &str = "md";

/// A file handle as the host hands it to plugins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteFile {
    path: PathBuf,
    basename: String,
    extension: String,
}

impl NoteFile {
    /// Builds a handle from a path. Returns `None` for paths without a file name.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let basename = path.file_stem()?.to_string_lossy().into_owned();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();
        Some(Self { path, basename, extension })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without its extension, i.e. the note title.
    pub fn basename(&self) -> &str {
        &self.basename
    }

    /// Extension without the leading dot; empty if the file has none.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn is_markdown(&self) -> bool {
        self.extension == MARKDOWN_EXTENSION
    }
}

/// Emitted by a vault when a new file appears in it.
#[derive(Debug, Clone)]
pub struct NoteCreated {
    pub file: NoteFile,
}

impl Event for NoteCreated {
    type HandlerReturnType = ();
}
