//! QuickNote's plugin logic on top of `quicknote_core`.
//!
//! - [`plugin::python::backend`] finds a Python interpreter, checks the
//!   backend's imports and supervises the backend process.
//! - [`summary`] talks to the backend over HTTP.
//! - [`quicknote`] ties both to a vault: configuration, activation, and the
//!   handler that writes summaries into new notes.

pub mod plugin;
pub mod quicknote;
pub mod summary;
