use serde::{Deserialize, Serialize};
use sheetsync_engine::SyncOptions;
use sheetsync_engine::sync::StatusLabels;
use sheetsync_engine::template::TemplateLayout;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },
}

/// Engine defaults, the single source for every optional field.
fn defaults() -> SyncOptions {
    SyncOptions::new(String::new())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Id or URL of the database holding templates.
    pub template_box_database: String,
    /// May reference environment variables, e.g. `"$NOTION_API_KEY"`.
    #[serde(default)]
    pub api_token: String,
    #[serde(default = "default_order_property")]
    pub order_property: String,
    #[serde(default = "default_order_column")]
    pub order_column: String,
    #[serde(default = "default_status_property")]
    pub status_property: String,
    #[serde(default = "default_pre_process_scope_property")]
    pub pre_process_scope_property: String,
    #[serde(default = "default_rewrite_batch_size")]
    pub rewrite_batch_size: usize,
    #[serde(default)]
    pub status: StatusLabels,
    #[serde(default)]
    pub layout: TemplateLayout,
}

fn default_order_property() -> String {
    defaults().order_property
}

fn default_order_column() -> String {
    defaults().order_column
}

fn default_status_property() -> String {
    defaults().status_property
}

fn default_pre_process_scope_property() -> String {
    defaults().pre_process_scope_property
}

fn default_rewrite_batch_size() -> usize {
    defaults().rewrite_batch_size
}

impl Config {
    pub fn new(template_box_database: impl Into<String>) -> Self {
        let defaults = defaults();
        Self {
            template_box_database: template_box_database.into(),
            api_token: String::new(),
            order_property: defaults.order_property,
            order_column: defaults.order_column,
            status_property: defaults.status_property,
            pre_process_scope_property: defaults.pre_process_scope_property,
            rewrite_batch_size: defaults.rewrite_batch_size,
            status: defaults.status,
            layout: defaults.layout,
        }
    }

    /// Engine options for this configuration.
    pub fn sync_options(&self) -> SyncOptions {
        let mut options = SyncOptions::new(self.template_box_database.clone());
        options.order_property = self.order_property.clone();
        options.order_column = self.order_column.clone();
        options.status_property = self.status_property.clone();
        options.pre_process_scope_property = self.pre_process_scope_property.clone();
        options.rewrite_batch_size = self.rewrite_batch_size;
        options.status = self.status.clone();
        options.layout = self.layout.clone();
        options
    }

    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        // Secrets are usually referenced from the environment
        if let Some(token) = Self::expand(&config.api_token) {
            config.api_token = token;
        }

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/sheetsync");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    fn expand(value: &str) -> Option<String> {
        shellexpand::full(value).ok().map(|v| v.into_owned())
    }
}
