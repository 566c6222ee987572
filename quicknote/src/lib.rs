use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use quicknote_core::vault::FsVault;
use quicknote_extensions::quicknote::PluginConfig;

pub mod cli;
pub mod commands;
pub mod notifier;

pub struct AppContext {
    pub vault: Arc<FsVault>,
    pub plugin_dir: PathBuf,
    pub config: PluginConfig,
}

impl AppContext {
    /// Opens the vault and loads the plugin settings, with command-line and
    /// environment overrides applied on top.
    pub async fn load(cli: &cli::Cli) -> anyhow::Result<Self> {
        let vault = FsVault::open(&cli.vault, cli.config_dir.clone())
            .await
            .with_context(|| format!("Failed to open vault at {}", cli.vault.display()))?;

        let defaults = PluginConfig::default();
        let plugin_dir = defaults.plugin_dir(vault.root(), &cli.config_dir);
        let mut config = PluginConfig::load(&plugin_dir).await?;
        let plugin_dir = config.plugin_dir(vault.root(), &cli.config_dir);

        if let Some(python) = &cli.python {
            config.interpreter = Some(python.clone());
        }
        if let Some(url) = &cli.backend_url {
            config.server.base_url = url.clone();
        }
        if let Some(model) = &cli.model {
            config.server.model = model.clone();
        }
        if let Some(secs) = cli.startup_timeout {
            config.startup_timeout_secs = (secs > 0).then_some(secs);
        }

        Ok(Self {
            vault: Arc::new(vault),
            plugin_dir,
            config,
        })
    }
}
