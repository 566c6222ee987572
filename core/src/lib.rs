//! Host-side building blocks for QuickNote.
//!
//! The note-editing host is an external collaborator. This crate pins down the
//! small surface a plugin needs from it ([`vault::Vault`], [`vault::Notifier`],
//! [`note::NoteCreated`] events) and provides a directory-backed implementation
//! so the plugin can also run standalone.

pub mod event;
pub mod note;
pub mod vault;

pub use note::{NoteCreated, NoteFile};
pub use vault::{FsVault, Notifier, Vault, VaultError};
