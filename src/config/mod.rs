//! Configuration management for Mynofi
//!
//! `Config` is the typed view used at runtime. Edits from `config set` go
//! through a `toml_edit` document so comments and layout in the user's file
//! survive.

pub mod layout;
pub mod schema;

pub use layout::StateLayout;
pub use schema::{Config, ConnectionSettings};

use crate::error::{MynofiError, MynofiResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use toml_edit::DocumentMut;
use tracing::{debug, info};

/// Reads and writes the config file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for `<config dir>/mynofi/config.toml`
    pub fn new() -> Self {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::with_path(base.join("mynofi").join("config.toml"))
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Typed config; a missing file yields the defaults
    pub async fn load(&self) -> MynofiResult<Config> {
        let Some(content) = self.read().await? else {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        };
        self.parse(&content)
    }

    /// Editable document; a missing file yields an empty one
    pub async fn load_document(&self) -> MynofiResult<DocumentMut> {
        let content = self.read().await?.unwrap_or_default();
        content
            .parse::<DocumentMut>()
            .map_err(|e| self.invalid(e.to_string()))
    }

    /// Replace the file with a freshly serialized config
    pub async fn save(&self, config: &Config) -> MynofiResult<()> {
        self.write(&toml::to_string_pretty(config)?).await
    }

    /// Write an edited document back, after checking it still parses as `Config`
    pub async fn save_document(&self, document: &DocumentMut) -> MynofiResult<()> {
        let content = document.to_string();
        self.parse(&content)?;
        self.write(&content).await
    }

    /// Set `section.field` in place, leaving the rest of the file untouched
    pub async fn set_entry(&self, section: &str, field: &str, item: toml_edit::Item) -> MynofiResult<()> {
        let mut document = self.load_document().await?;
        let table = document
            .entry(section)
            .or_insert_with(toml_edit::table)
            .as_table_like_mut()
            .ok_or_else(|| self.invalid(format!("[{section}] is not a table")))?;
        table.insert(field, item);
        self.save_document(&document).await
    }

    async fn read(&self) -> MynofiResult<Option<String>> {
        match fs::read_to_string(&self.config_path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MynofiError::io(
                format!("reading config from {}", self.config_path.display()),
                e,
            )),
        }
    }

    fn parse(&self, content: &str) -> MynofiResult<Config> {
        toml::from_str(content).map_err(|e| self.invalid(e.to_string()))
    }

    fn invalid(&self, reason: String) -> MynofiError {
        MynofiError::ConfigInvalid {
            path: self.config_path.clone(),
            reason,
        }
    }

    async fn write(&self, content: &str) -> MynofiResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| MynofiError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        fs::write(&self.config_path, content).await.map_err(|e| {
            MynofiError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
