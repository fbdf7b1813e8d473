//! Error types for smi
//!
//! All modules use `SmiResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for smi operations
pub type SmiResult<T> = Result<T, SmiError>;

/// All errors that can occur in smi
#[derive(Error, Debug)]
pub enum SmiError {
    // Configuration errors
    #[error("No cache root configured: pass --cache-dir, set cache.root, or export SMI_CACHE_DIRPATH")]
    CacheRootMissing,

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Descriptor errors
    #[error("Cannot install package '{}' as no package.json found", .0.display())]
    DescriptorMissing(PathBuf),

    #[error("Failed to parse package descriptor {path}: {reason}")]
    DescriptorParse { path: PathBuf, reason: String },

    // Installer errors
    #[error("{command} exited with code '{code}' and stderr: {stderr}")]
    InstallerFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("{command} did not finish within {seconds}s and was killed")]
    InstallerTimeout { command: String, seconds: u64 },

    // Cache errors
    #[error("Copy failed: {command}, stderr: {stderr}")]
    CopyFailed { command: String, stderr: String },

    #[error("Corrupt cache entry {path}: {reason}")]
    CacheEntryCorrupt { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl SmiError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a copy failure error
    pub fn copy_failed(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CopyFailed {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether a failure while populating the cache may be logged and absorbed.
    ///
    /// Cache writes happen after a successful install, so copy and filesystem
    /// failures there never fail the install itself.
    pub fn is_cache_write_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CopyFailed { .. } | Self::Io { .. } | Self::CommandFailed { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CacheRootMissing => Some("Run: export SMI_CACHE_DIRPATH=~/.cache/smi"),
            Self::DescriptorMissing(_) => Some("Run smi from a directory containing package.json"),
            Self::InstallerTimeout { .. } => Some("Raise install.timeout_secs in the config file"),
            Self::CacheEntryCorrupt { .. } => Some("Run: smi cache clear"),
            _ => None,
        }
    }
}
