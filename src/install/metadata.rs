//! Install marker persistence
//!
//! A small JSON document inside the package directory records the
//! fingerprints taken before and after a completed install. Its presence,
//! together with the dependency tree, means the install can be trusted.
//!
//! Writes go through a temporary file and a rename, so the marker is either
//! absent or complete.

use crate::cache::InstallCacheKey;
use crate::error::{SmiError, SmiResult};
use crate::fingerprint::{DirTreeSnapshot, DEPENDENCY_DIR};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Marker file name inside the package directory
pub const MARKER_FILE: &str = ".smi-install.json";

/// How the installed state came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallSource {
    Installer,
    Cache,
}

/// Persisted marker contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallMetadata {
    pub before: DirTreeSnapshot,
    pub after: DirTreeSnapshot,
    pub key: InstallCacheKey,
    pub source: InstallSource,
    pub installed_at: DateTime<Utc>,
}

impl InstallMetadata {
    /// Build a marker; per-path detail is dropped to keep it small
    pub fn new(
        before: DirTreeSnapshot,
        after: DirTreeSnapshot,
        key: InstallCacheKey,
        source: InstallSource,
    ) -> Self {
        Self {
            before: before.stripped(),
            after: after.stripped(),
            key,
            source,
            installed_at: Utc::now(),
        }
    }
}

/// Marker file of one package directory
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn for_package(package_dir: &Path) -> Self {
        Self {
            path: package_dir.join(MARKER_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Read the marker if present
    pub async fn read(&self) -> SmiResult<Option<InstallMetadata>> {
        if !self.exists().await {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| SmiError::io(format!("reading marker {}", self.path.display()), e))?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub async fn write(&self, meta: &InstallMetadata) -> SmiResult<()> {
        let content = serde_json::to_string_pretty(meta)?;
        let temp = self.path.with_extension(format!("tmp-{}", std::process::id()));

        fs::write(&temp, content)
            .await
            .map_err(|e| SmiError::io(format!("writing marker {}", temp.display()), e))?;
        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| SmiError::io(format!("writing marker {}", self.path.display()), e))?;

        debug!("Wrote install marker {}", self.path.display());
        Ok(())
    }

    pub async fn remove(&self) -> SmiResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Removed stale install marker {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SmiError::io(format!("removing marker {}", self.path.display()), e)),
        }
    }
}

/// Dependency tree and marker both present
pub async fn is_installed(package_dir: &Path) -> bool {
    let modules = fs::metadata(package_dir.join(DEPENDENCY_DIR))
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    modules && MetadataStore::for_package(package_dir).exists().await
}
