//! Application configuration
//!
//! Loaded from `chatter.toml`, either the path given on the command line or
//! the platform config directory. Every field has a default, so a missing
//! default file is not an error.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chatter_net::NetConfig;
use directories::ProjectDirs;
use serde::Deserialize;

/// Config file name inside the platform config directory
const CONFIG_FILE: &str = "chatter.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read config: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Identity used when hosting or joining
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub player: PlayerConfig,
    pub network: NetConfig,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dirs = ProjectDirs::from("dev", "chatter", "chatter").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join(CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Load an explicit file, or the default file if it exists
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Ok(path) if path.exists() => Self::load(&path),
            Ok(_) | Err(ConfigError::NoConfigDir) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}
