//! On-disk cache entries
//!
//! Layout under `<root>/<epoch>/`:
//!
//! | Entry | Contents |
//! |-------|----------|
//! | `<dependenciesHash>-dependencies/` | copy of `node_modules` |
//! | `<pathsHash>-changes/` | non-dependency paths the install created or changed |
//!
//! Entries are immutable. A write to an existing key is a no-op. New entries
//! are filled under a temporary name and renamed into place, so a reader
//! never observes a half-written entry.

use crate::cache::copy::BulkCopy;
use crate::cache::key::{EntryKind, InstallCacheKey};
use crate::config::CacheSettings;
use crate::error::{SmiError, SmiResult};
use crate::fingerprint::DEPENDENCY_DIR;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Result of a cache write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// New entry published
    Stored,
    /// Entry already existed (first writer wins)
    AlreadyCached,
    /// Nothing to store
    Skipped,
}

/// A cache entry found on disk
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub name: String,
    pub hash: String,
    pub kind: EntryKind,
    pub path: PathBuf,
}

enum Fill<'a> {
    Tree(&'a Path),
    Paths { root: &'a Path, paths: &'a [String] },
}

/// Cache entries for one epoch
#[derive(Clone)]
pub struct CacheStore {
    dir: PathBuf,
    copier: Arc<dyn BulkCopy>,
}

impl CacheStore {
    pub fn new(settings: &CacheSettings, copier: Arc<dyn BulkCopy>) -> Self {
        Self {
            dir: settings.epoch_dir(),
            copier,
        }
    }

    /// Directory holding this epoch's entries
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, key: &InstallCacheKey, kind: EntryKind) -> PathBuf {
        self.dir.join(key.entry_name(kind))
    }

    /// Whether a published entry exists
    pub async fn contains(&self, key: &InstallCacheKey, kind: EntryKind) -> bool {
        fs::try_exists(self.entry_path(key, kind)).await.unwrap_or(false)
    }

    /// Copy a cached dependency tree into `package_dir/node_modules`.
    ///
    /// Returns false when no entry exists.
    pub async fn restore_dependencies(&self, key: &InstallCacheKey, package_dir: &Path) -> SmiResult<bool> {
        let Some(entry) = self.published(key, EntryKind::Dependencies).await? else {
            return Ok(false);
        };
        info!("Restoring dependency tree from {}", entry.display());
        self.copier
            .copy_tree(&entry, &package_dir.join(DEPENDENCY_DIR))
            .await?;
        Ok(true)
    }

    /// Copy cached install changes into `package_dir`.
    ///
    /// Returns false when no entry exists.
    pub async fn restore_changes(&self, key: &InstallCacheKey, package_dir: &Path) -> SmiResult<bool> {
        let Some(entry) = self.published(key, EntryKind::Changes).await? else {
            return Ok(false);
        };
        info!("Restoring install changes from {}", entry.display());
        self.copier.copy_tree(&entry, package_dir).await?;
        Ok(true)
    }

    /// Snapshot `package_dir/node_modules` under the dependencies hash
    pub async fn store_dependencies(&self, key: &InstallCacheKey, package_dir: &Path) -> SmiResult<StoreOutcome> {
        let modules = package_dir.join(DEPENDENCY_DIR);
        if !is_dir(&modules).await {
            debug!("No {} to snapshot in {}", DEPENDENCY_DIR, package_dir.display());
            return Ok(StoreOutcome::Skipped);
        }
        self.publish(self.entry_path(key, EntryKind::Dependencies), Fill::Tree(&modules))
            .await
    }

    /// Snapshot the listed changed paths under the paths hash.
    ///
    /// An empty list still publishes an (empty) entry, marking the install as
    /// one that changes nothing outside the dependency tree.
    pub async fn store_changes(
        &self,
        key: &InstallCacheKey,
        package_dir: &Path,
        paths: &[String],
    ) -> SmiResult<StoreOutcome> {
        self.publish(
            self.entry_path(key, EntryKind::Changes),
            Fill::Paths {
                root: package_dir,
                paths,
            },
        )
        .await
    }

    async fn published(&self, key: &InstallCacheKey, kind: EntryKind) -> SmiResult<Option<PathBuf>> {
        let path = self.entry_path(key, kind);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(Some(path)),
            Ok(_) => Err(SmiError::CacheEntryCorrupt {
                path,
                reason: "entry is not a directory".to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SmiError::io(format!("checking {}", path.display()), e)),
        }
    }

    async fn publish(&self, target: PathBuf, fill: Fill<'_>) -> SmiResult<StoreOutcome> {
        if fs::try_exists(&target).await.unwrap_or(false) {
            debug!("Cache entry {} already exists", target.display());
            return Ok(StoreOutcome::AlreadyCached);
        }

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| SmiError::io(format!("creating cache dir {}", self.dir.display()), e))?;

        let temp = temp_path(&target);
        remove_if_present(&temp).await?;

        let filled = match fill {
            Fill::Tree(source) => self.copier.copy_tree(source, &temp).await,
            Fill::Paths { paths, .. } if paths.is_empty() => fs::create_dir_all(&temp)
                .await
                .map_err(|e| SmiError::io(format!("creating {}", temp.display()), e)),
            Fill::Paths { root, paths } => self.copier.copy_paths(root, &temp, paths).await,
        };

        if let Err(e) = filled {
            if let Err(cleanup) = remove_if_present(&temp).await {
                warn!("Failed to clean up partial entry {}: {}", temp.display(), cleanup);
            }
            return Err(e);
        }

        match fs::rename(&temp, &target).await {
            Ok(()) => {
                info!("Stored cache entry {}", target.display());
                Ok(StoreOutcome::Stored)
            }
            Err(e) => {
                remove_if_present(&temp).await?;
                if fs::try_exists(&target).await.unwrap_or(false) {
                    debug!("Lost publish race for {}", target.display());
                    Ok(StoreOutcome::AlreadyCached)
                } else {
                    Err(SmiError::io(format!("publishing {}", target.display()), e))
                }
            }
        }
    }

    /// All published entries in this epoch, sorted by name
    pub async fn list(&self) -> SmiResult<Vec<CacheEntry>> {
        if !is_dir(&self.dir).await {
            return Ok(vec![]);
        }

        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| SmiError::io(format!("reading {}", self.dir.display()), e))?;

        let mut found = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SmiError::io(format!("reading {}", self.dir.display()), e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((hash, kind)) = EntryKind::parse_dir_name(&name) {
                found.push(CacheEntry {
                    hash: hash.to_string(),
                    kind,
                    path: entry.path(),
                    name,
                });
            }
        }
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    /// Remove every entry in this epoch; returns how many were removed
    pub async fn clear(&self) -> SmiResult<usize> {
        let entries = self.list().await?;
        for entry in &entries {
            debug!("Removing cache entry {}", entry.name);
            remove_if_present(&entry.path).await?;
        }
        Ok(entries.len())
    }
}

fn temp_path(target: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = target
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!("{}.tmp-{}-{}", name, std::process::id(), n))
}

async fn remove_if_present(path: &Path) -> SmiResult<()> {
    let meta = match fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(SmiError::io(format!("checking {}", path.display()), e)),
    };
    let result = if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    result.map_err(|e| SmiError::io(format!("removing {}", path.display()), e))
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}
