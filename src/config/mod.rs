//! Configuration management for smi
//!
//! The TOML file is only one source. Entry points resolve it together with
//! command-line flags and the environment into explicit settings
//! (`CacheSettings`) that are handed to the core.

pub mod schema;

pub use schema::Config;

use crate::error::{SmiError, SmiResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Environment variable naming the cache root
pub const CACHE_DIR_ENV: &str = "SMI_CACHE_DIRPATH";

/// Environment variable naming the cache epoch
pub const CACHE_EPOCH_ENV: &str = "SMI_CACHE_EPOCH";

/// Epoch used when none is configured
pub const DEFAULT_EPOCH: &str = "default";

/// Resolved cache location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub root: PathBuf,
    pub epoch: String,
}

impl CacheSettings {
    /// Directory holding entries for the active epoch
    pub fn epoch_dir(&self) -> PathBuf {
        self.root.join(&self.epoch)
    }

    /// Resolve from (in order) explicit values, the config file, then `env`.
    ///
    /// A missing root is a configuration error; a missing epoch is not.
    pub fn resolve<F>(
        root_override: Option<PathBuf>,
        epoch_override: Option<String>,
        config: &Config,
        env: F,
    ) -> SmiResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = root_override
            .or_else(|| config.cache.root.clone())
            .or_else(|| non_empty(env(CACHE_DIR_ENV)).map(PathBuf::from))
            .ok_or(SmiError::CacheRootMissing)?;

        let epoch = epoch_override
            .or_else(|| config.cache.epoch.clone())
            .or_else(|| non_empty(env(CACHE_EPOCH_ENV)))
            .unwrap_or_else(|| DEFAULT_EPOCH.to_string());

        if epoch.contains('/') || epoch.contains('\\') || epoch == ".." || epoch == "." {
            return Err(SmiError::User(format!(
                "Invalid cache epoch '{}': must be a single directory name",
                epoch
            )));
        }

        Ok(Self { root, epoch })
    }

    /// Resolve against the process environment
    pub fn from_env(
        root_override: Option<PathBuf>,
        epoch_override: Option<String>,
        config: &Config,
    ) -> SmiResult<Self> {
        Self::resolve(root_override, epoch_override, config, |name| {
            std::env::var(name).ok()
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

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
            .join("smi")
            .join("config.toml")
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> SmiResult<Config> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> SmiResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| SmiError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| SmiError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> SmiResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            SmiError::io(format!("writing config to {}", self.config_path.display()), e)
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    async fn ensure_config_dir(&self) -> SmiResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SmiError::ConfigDirCreate {
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
