//! Configuration schema for ltc-client
//!
//! Configuration is stored at `~/.config/ltc/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Device selection
    pub device: DeviceConfig,

    /// Compile cache settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable verbose logging
    pub verbose: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            log_format: "text".to_string(),
        }
    }
}

/// Device selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Default device kind ("GPU" or "CPU")
    pub default_kind: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            default_kind: "CPU".to_string(),
        }
    }
}

/// Compile cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the persistent compile cache (default: true)
    pub enabled: bool,

    /// Cache root directory (default: platform cache dir)
    pub dir: Option<PathBuf>,

    /// Recompile instead of failing when a cached artifact is unreadable
    pub recompile_on_corrupt: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            recompile_on_corrupt: false,
        }
    }
}

impl CacheConfig {
    /// Resolve the cache root, falling back to `~/.cache/ltc/compile`
    pub fn root(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("ltc")
                .join("compile")
        })
    }
}
