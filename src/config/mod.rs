//! Configuration management for ltc-client

pub mod schema;

pub use schema::Config;

use crate::env;
use crate::error::{ClientError, ClientResult};
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
            .join("ltc")
            .join("config.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    ///
    /// Environment overrides are applied on top of the file contents.
    pub async fn load(&self) -> ClientResult<Config> {
        let mut config = if self.config_path.exists() {
            self.load_from_file(&self.config_path).await?
        } else {
            debug!("Config file not found, using defaults");
            Config::default()
        };

        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> ClientResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ClientError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| ClientError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> ClientResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            ClientError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> ClientResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ClientError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
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

/// Apply `LTC_*` environment variables over loaded configuration
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(kind) = env::var(env::DEFAULT_DEVICE) {
        debug!("Default device kind from {}: {}", env::DEFAULT_DEVICE, kind);
        config.device.default_kind = kind;
    }
    if let Some(enabled) = env::flag(env::COMPILE_CACHE) {
        debug!("Compile cache enabled from {}: {}", env::COMPILE_CACHE, enabled);
        config.cache.enabled = enabled;
    }
    if let Some(dir) = env::var(env::CACHE_DIR) {
        config.cache.dir = Some(PathBuf::from(dir));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var(env::DEFAULT_DEVICE);
        std::env::remove_var(env::COMPILE_CACHE);
        std::env::remove_var(env::CACHE_DIR);
    }

    #[tokio::test]
    #[serial]
    async fn load_default_when_missing() {
        clear_env();
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.device.default_kind, "CPU");
        assert!(config.cache.enabled);
    }

    #[tokio::test]
    #[serial]
    async fn save_and_load_roundtrip() {
        clear_env();
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.device.default_kind = "GPU".to_string();
        config.cache.recompile_on_corrupt = true;

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded.device.default_kind, "GPU");
        assert!(loaded.cache.recompile_on_corrupt);
    }

    #[tokio::test]
    #[serial]
    async fn invalid_file_is_reported_with_path() {
        clear_env();
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[cache]\nenabled = \"maybe\"\n").unwrap();

        let err = ConfigManager::with_path(path.clone()).load().await.unwrap_err();
        match err {
            ClientError::ConfigInvalid { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        clear_env();
        std::env::set_var(env::DEFAULT_DEVICE, "GPU");
        std::env::set_var(env::COMPILE_CACHE, "0");
        std::env::set_var(env::CACHE_DIR, "/tmp/ltc-test-cache");

        let mut config = Config::default();
        apply_env_overrides(&mut config);
        clear_env();

        assert_eq!(config.device.default_kind, "GPU");
        assert!(!config.cache.enabled);
        assert_eq!(config.cache.dir, Some(PathBuf::from("/tmp/ltc-test-cache")));
    }

    #[test]
    #[serial]
    fn empty_env_values_are_ignored() {
        clear_env();
        std::env::set_var(env::DEFAULT_DEVICE, "  ");

        let mut config = Config::default();
        apply_env_overrides(&mut config);
        clear_env();

        assert_eq!(config.device.default_kind, "CPU");
    }
}
