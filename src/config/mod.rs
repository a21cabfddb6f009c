//! Configuration management for Berth

pub mod schema;

pub use schema::Config;

use crate::error::{BerthError, BerthResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("berth")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("berth")
    }

    /// Catalog file for a config
    pub fn catalog_path(config: &Config) -> PathBuf {
        config
            .catalog
            .path
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("catalog.json"))
    }

    /// Creation lock directory for a config
    pub fn locks_dir(config: &Config) -> PathBuf {
        config
            .locks
            .dir
            .clone()
            .unwrap_or_else(|| Self::state_dir().join("locks"))
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> BerthResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> BerthResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| BerthError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| BerthError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> BerthResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            BerthError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> BerthResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| BerthError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure the catalog and lock directories exist
    pub async fn ensure_state_dirs(config: &Config) -> BerthResult<()> {
        let catalog_path = Self::catalog_path(config);
        let mut dirs = vec![Self::locks_dir(config)];
        if let Some(parent) = catalog_path.parent() {
            dirs.push(parent.to_path_buf());
        }

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                BerthError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.worker.name, "local");
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.worker.name = "test-worker".to_string();

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.worker.name, "test-worker");
    }

    #[tokio::test]
    async fn invalid_toml_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[worker\nname = 1").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, BerthError::ConfigInvalid { .. }));
    }

    #[tokio::test]
    async fn state_paths_follow_overrides() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.catalog.path = Some(temp.path().join("db/catalog.json"));
        config.locks.dir = Some(temp.path().join("locks"));

        ConfigManager::ensure_state_dirs(&config).await.unwrap();

        assert!(temp.path().join("db").is_dir());
        assert!(temp.path().join("locks").is_dir());
        assert_eq!(
            ConfigManager::catalog_path(&config),
            temp.path().join("db/catalog.json")
        );
    }
}
