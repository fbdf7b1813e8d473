//! Configuration schema for smi
//!
//! Configuration is stored at `~/.config/smi/config.toml`

use crate::cache::CopyBackend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache location and backend
    pub cache: CacheConfig,

    /// Installer invocation and linking
    pub install: InstallConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Mirror installer output to the terminal
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

/// Cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root; falls back to SMI_CACHE_DIRPATH
    pub root: Option<PathBuf>,

    /// Cache generation; falls back to SMI_CACHE_EPOCH, then "default"
    pub epoch: Option<String>,

    /// How entries are copied in and out
    pub copy_backend: CopyBackend,
}

/// Installer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Package manager executable, invoked as `<command> install <args>`
    pub command: String,

    /// Extra arguments appended after `install`
    pub args: Vec<String>,

    /// Kill the installer after this many seconds (unset = no limit)
    pub timeout_secs: Option<u64>,

    /// Create symlinks relative to the link's directory
    pub relative_links: bool,

    /// Link for every package.json below the package, not just its own
    pub transitive_links: bool,

    /// Extra directories to search (with their ancestors) for available packages
    pub link_sources: Vec<PathBuf>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            command: "npm".to_string(),
            args: vec![],
            timeout_secs: None,
            relative_links: true,
            transitive_links: false,
            link_sources: vec![],
        }
    }
}
