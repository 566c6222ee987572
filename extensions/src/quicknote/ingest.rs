use std::fmt;
use std::sync::Arc;

use quicknote_core::note::NoteFile;
use quicknote_core::vault::{Notifier, Vault, VaultError};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::config::InsertMode;
use super::notices;
use crate::summary::{SummaryClient, SummaryError};

/// The definition block written into a new note.
pub fn format_snippet(summary: &str) -> String {
    format!("- ==Def== :{summary} \n ---\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotMarkdown,
    /// Title still carries the host's placeholder name.
    DefaultName,
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Summary(#[from] SummaryError),

    #[error("Failed to write summary into note: {0}")]
    Write(#[from] VaultError),
}

#[derive(Debug)]
pub enum IngestOutcome {
    Skipped(SkipReason),
    Inserted { keyword: String },
    Failed(IngestError),
}

/// Turns a newly created note into a summary request and writes the answer
/// back into the note.
pub struct NoteIngestHandler {
    client: SummaryClient,
    vault: Arc<dyn Vault>,
    notifier: Arc<dyn Notifier>,
    sentinel: String,
    insert_mode: InsertMode,
}

impl NoteIngestHandler {
    pub fn new(
        client: SummaryClient,
        vault: Arc<dyn Vault>,
        notifier: Arc<dyn Notifier>,
        sentinel: impl Into<String>,
        insert_mode: InsertMode,
    ) -> Self {
        Self {
            client,
            vault,
            notifier,
            sentinel: sentinel.into(),
            insert_mode,
        }
    }

    pub fn client(&self) -> &SummaryClient {
        &self.client
    }

    /// The keyword to summarize for `title`, or why it should be left alone.
    pub fn keyword_for<'a>(&self, title: &'a str) -> Result<&'a str, SkipReason> {
        if !self.sentinel.is_empty() && title.contains(self.sentinel.as_str()) {
            return Err(SkipReason::DefaultName);
        }
        Ok(title)
    }

    /// Handles one created file. Never panics and never propagates: failures
    /// end up as a notice and an [`IngestOutcome::Failed`].
    #[instrument(skip(self), fields(note = %note.path().display()))]
    pub async fn handle(&self, note: &NoteFile) -> IngestOutcome {
        if !note.is_markdown() {
            debug!("Not a markdown note, ignoring");
            return IngestOutcome::Skipped(SkipReason::NotMarkdown);
        }
        let keyword = match self.keyword_for(note.basename()) {
            Ok(keyword) => keyword.to_string(),
            Err(reason) => {
                debug!(?reason, "Note skipped");
                return IngestOutcome::Skipped(reason);
            }
        };

        match self.insert_summary(note, &keyword).await {
            Ok(()) => {
                info!(keyword, "Summary inserted");
                self.notifier.notice(notices::SUMMARY_INSERTED);
                IngestOutcome::Inserted { keyword }
            }
            Err(e) => {
                let kind = match &e {
                    IngestError::Summary(inner) => inner.kind(),
                    IngestError::Write(_) => "write",
                };
                warn!(keyword, kind, error = %e, "Failed to insert summary");
                self.notifier.notice(notices::SUMMARY_FAILED);
                IngestOutcome::Failed(e)
            }
        }
    }

    async fn insert_summary(&self, note: &NoteFile, keyword: &str) -> Result<(), IngestError> {
        let summary = self.client.fetch_summary(keyword).await?;
        let snippet = format_snippet(&summary);
        let mode = self.insert_mode;
        self.vault
            .process(note, Box::new(move |current| mode.apply(current, &snippet)))
            .await?;
        Ok(())
    }
}

impl fmt::Debug for NoteIngestHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoteIngestHandler")
            .field("client", &self.client)
            .field("sentinel", &self.sentinel)
            .field("insert_mode", &self.insert_mode)
            .finish_non_exhaustive()
    }
}
