//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/blinky/config.toml)
//! 3. Environment variables (BLINKY_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable prefix
const ENV_PREFIX: &str = "BLINKY";

/// Key of the live section collection in the local medium
pub const SECTIONS_KEY: &str = "sections";

/// Prefix of timestamped backup keys in the local medium
pub const BACKUP_KEY_PREFIX: &str = "sections_backup_";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for the device-local key-value medium
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// SQLite file standing in for the per-user document store
    ///
    /// Defaults to `<data_dir>/remote.db` when unset.
    #[serde(default)]
    pub remote_db: Option<PathBuf>,

    /// The signed-in user, if any
    #[serde(default)]
    pub user_id: Option<String>,

    /// Optional log destination (stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            remote_db: None,
            user_id: None,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (BLINKY_DATA_DIR, BLINKY_REMOTE_DB, BLINKY_USER_ID)
    /// 2. Config file (~/.config/blinky/config.toml or BLINKY_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_REMOTE_DB", ENV_PREFIX)) {
            self.remote_db = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        // An empty BLINKY_USER_ID means signed out
        if let Ok(val) = std::env::var(format!("{}_USER_ID", ENV_PREFIX)) {
            self.user_id = if val.is_empty() { None } else { Some(val) };
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with BLINKY_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("blinky")
            .join("config.toml")
    }

    /// Get the path of the remote document database
    pub fn remote_db_path(&self) -> PathBuf {
        self.remote_db
            .clone()
            .unwrap_or_else(|| self.data_dir.join("remote.db"))
    }
}

/// Key for a backup snapshot taken at `timestamp_ms`
pub fn backup_key(timestamp_ms: i64) -> String {
    format!("{}{}", BACKUP_KEY_PREFIX, timestamp_ms)
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("blinky")
}
