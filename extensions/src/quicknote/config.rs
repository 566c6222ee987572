use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::plugin::python::backend::probe::DEFAULT_REQUIRED_MODULES;
use crate::plugin::python::backend::{IndeterminatePolicy, ServerOptions};
use crate::summary::client::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::summary::{SummaryConfig, SummaryError};

/// The host's per-plugin data file, inside the plugin directory.
pub const SETTINGS_FILE: &str = "data.json";

pub const DEFAULT_PLUGIN_ID: &str = "quicknote";
pub const DEFAULT_PLUGIN_NAME: &str = "QuickNote";
/// Substring of the host's placeholder title for new notes.
pub const DEFAULT_NAME_SENTINEL: &str = "Untitled";
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file '{}' is not valid: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where the snippet goes relative to the note's existing content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertMode {
    /// Overwrite the whole note.
    #[default]
    Replace,
    Prepend,
    Append,
}

impl InsertMode {
    pub fn apply(self, current: &str, snippet: &str) -> String {
        match self {
            InsertMode::Replace => snippet.to_string(),
            InsertMode::Prepend => format!("{snippet}{current}"),
            InsertMode::Append => format!("{current}{snippet}"),
        }
    }
}

impl FromStr for InsertMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(InsertMode::Replace),
            "prepend" => Ok(InsertMode::Prepend),
            "append" => Ok(InsertMode::Append),
            other => Err(format!("unknown insert mode '{other}' (expected replace, prepend or append)")),
        }
    }
}

impl fmt::Display for InsertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InsertMode::Replace => "replace",
            InsertMode::Prepend => "prepend",
            InsertMode::Append => "append",
        })
    }
}

/// How to reach the backend once it is running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub base_url: String,
    pub model: String,
    pub request_timeout_secs: Option<u64>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_secs: None,
        }
    }
}

/// QuickNote settings. Every field is optional in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub plugin_id: String,
    pub plugin_name: String,
    /// Skips interpreter auto-detection.
    pub interpreter: Option<PathBuf>,
    pub required_modules: Vec<String>,
    pub indeterminate_policy: IndeterminatePolicy,
    /// `None` waits for the backend indefinitely.
    pub startup_timeout_secs: Option<u64>,
    pub server: ServerSettings,
    pub default_name_sentinel: String,
    pub insert_mode: InsertMode,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            plugin_id: DEFAULT_PLUGIN_ID.to_string(),
            plugin_name: DEFAULT_PLUGIN_NAME.to_string(),
            interpreter: None,
            required_modules: DEFAULT_REQUIRED_MODULES.iter().map(|m| m.to_string()).collect(),
            indeterminate_policy: IndeterminatePolicy::default(),
            startup_timeout_secs: Some(DEFAULT_STARTUP_TIMEOUT_SECS),
            server: ServerSettings::default(),
            default_name_sentinel: DEFAULT_NAME_SENTINEL.to_string(),
            insert_mode: InsertMode::default(),
        }
    }
}

impl PluginConfig {
    /// Reads `<plugin_dir>/data.json`. A missing file means all defaults.
    pub async fn load(plugin_dir: &Path) -> Result<Self, ConfigError> {
        let path = plugin_dir.join(SETTINGS_FILE);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };
        let config = serde_json::from_slice(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "Settings loaded");
        Ok(config)
    }

    /// `<vault>/<config_dir>/plugins/<plugin_id>`, or the `<plugin_name>`
    /// directory when only that one exists.
    pub fn plugin_dir(&self, vault_root: &Path, config_dir: &str) -> PathBuf {
        let plugins = vault_root.join(config_dir).join("plugins");
        let by_id = plugins.join(&self.plugin_id);
        if by_id.is_dir() {
            return by_id;
        }
        let by_name = plugins.join(&self.plugin_name);
        if by_name.is_dir() {
            debug!(plugin_dir = %by_name.display(), "Using plugin directory named after the plugin");
            return by_name;
        }
        by_id
    }

    pub fn startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout_secs.map(Duration::from_secs)
    }

    pub fn server_options(&self, plugin_dir: &Path) -> ServerOptions {
        ServerOptions::new(plugin_dir)
            .with_startup_timeout(self.startup_timeout())
            .with_interpreter(self.interpreter.clone())
    }

    pub fn summary_config(&self) -> Result<SummaryConfig, SummaryError> {
        Ok(SummaryConfig::new()?
            .base_url(&self.server.base_url)?
            .model(&self.server.model)
            .timeout(self.server.request_timeout_secs.map(Duration::from_secs)))
    }
}
