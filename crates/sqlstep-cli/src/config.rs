//! CLI configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "sqlstep.toml";

/// Get the config file path.
///
/// `SQLSTEP_CONFIG` wins, then `./sqlstep.toml` when present, then the
/// per-user config directory.
pub fn config_file_path() -> PathBuf {
    if let Some(path) = std::env::var_os("SQLSTEP_CONFIG") {
        return PathBuf::from(path);
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sqlstep")
        .join("config.toml")
}

/// Configuration for the CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Postgres connection URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<String>,

    pub migrations_dir: String,

    pub version_table: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: None,
            postgres: None,
            migrations_dir: "./migrations".to_string(),
            version_table: sqlstep_storage::DEFAULT_VERSION_TABLE.to_string(),
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it is missing
    /// or unreadable
    pub fn load() -> Self {
        let path = config_file_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn keys() -> &'static [&'static str] {
        &["database", "postgres", "migrations_dir", "version_table"]
    }

    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "database" => self.database.clone(),
            "postgres" => self.postgres.clone(),
            "migrations_dir" => Some(self.migrations_dir.clone()),
            "version_table" => Some(self.version_table.clone()),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database" => self.database = non_empty(value),
            "postgres" => self.postgres = non_empty(value),
            "migrations_dir" => self.migrations_dir = value.to_string(),
            "version_table" => {
                sqlstep_storage::error::validate_identifier(value)?;
                self.version_table = value.to_string();
            }
            _ => anyhow::bail!(
                "Unknown config key: {}. Available keys: {}",
                key,
                Self::keys().join(", ")
            ),
        }
        Ok(())
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
