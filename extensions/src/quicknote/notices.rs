//! User-facing notice texts.

use std::fmt::Display;

pub const VAULT_PATH_UNKNOWN: &str = "QuickNote: Cannot determine vault path";
pub const SUMMARY_INSERTED: &str = "QuickNote: summary inserted!!!";
pub const SUMMARY_FAILED: &str = "QuickNote: failed to insert summary.";

pub fn dependencies_unverified(modules: &[String]) -> String {
    format!("QuickNote: couldn't verify Python dependencies ({})", modules.join(", "))
}

pub fn dependencies_missing(modules: &[String]) -> String {
    format!("QuickNote: Missing Python dependencies ({})", modules.join(", "))
}

pub fn backend_failed(cause: &impl Display) -> String {
    format!("QuickNote: backend failed to start, summaries are disabled. {cause}")
}
