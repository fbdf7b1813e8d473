//! Install orchestration
//!
//! ```text
//! NotInstalled -> Checking -> CacheHit ------------------------> Installed
//!                          \-> Installing -> Snapshotting ------> Installed
//! ```
//!
//! Any mandatory step failing (fingerprinting, linking, the installer, the
//! marker write) fails the install. Populating the cache is best effort:
//! failures there are logged and the install still succeeds.

use crate::cache::{BulkCopy, CacheStore, EntryKind, InstallCacheKey, StoreOutcome};
use crate::config::CacheSettings;
use crate::descriptor::PackageDescriptor;
use crate::error::{SmiError, SmiResult};
use crate::fingerprint::{
    fingerprint, is_dependency_path, DirTreeSnapshot, FingerprintMode, FingerprintOptions,
    DEPENDENCY_DIR,
};
use crate::install::installer::Installer;
use crate::install::metadata::{
    is_installed, InstallMetadata, InstallSource, MetadataStore, MARKER_FILE,
};
use crate::link::{link_available, locate_all, LinkOptions, LinkReport};
use futures_util::future::join_all;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// How an install call was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Dependency tree and marker were already present
    AlreadyInstalled,
    /// Both cache entries existed and were copied in
    RestoredFromCache,
    /// The external installer ran
    Installed,
}

impl fmt::Display for InstallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInstalled => write!(f, "already installed"),
            Self::RestoredFromCache => write!(f, "installed from cache"),
            Self::Installed => write!(f, "installed"),
        }
    }
}

/// Per-invocation install behavior
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Arguments appended after `install`
    pub args: Vec<String>,
    pub link: LinkOptions,
    /// Extra starting points for the availability lookup
    pub link_sources: Vec<PathBuf>,
}

/// Cache state of a package, without changing anything
#[derive(Debug, Clone)]
pub struct InstallStatus {
    pub package_dir: PathBuf,
    pub name: Option<String>,
    pub marker: PathBuf,
    pub key: InstallCacheKey,
    pub installed: bool,
    pub dependencies_cached: bool,
    pub changes_cached: bool,
    pub metadata: Option<InstallMetadata>,
}

/// Cached installer for packages
pub struct InstallCache {
    store: CacheStore,
    installer: Arc<dyn Installer>,
    options: InstallOptions,
}

impl InstallCache {
    pub fn new(
        settings: &CacheSettings,
        copier: Arc<dyn BulkCopy>,
        installer: Arc<dyn Installer>,
        options: InstallOptions,
    ) -> Self {
        Self {
            store: CacheStore::new(settings, copier),
            installer,
            options,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Install dependencies for the package at `package_dir`
    pub async fn install(&self, package_dir: &Path) -> SmiResult<InstallOutcome> {
        let package_dir = canonical(package_dir).await?;
        info!("Installing: {}", package_dir.display());

        if is_installed(&package_dir).await {
            info!("Already installed");
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        let marker = MetadataStore::for_package(&package_dir);
        marker.remove().await?;

        let descriptor = PackageDescriptor::from_dir(&package_dir).await?;
        let before = fingerprint(&package_dir, &walk_options(FingerprintMode::DeclarationOnly)).await?;
        let key = InstallCacheKey::derive(&before, &descriptor)?;
        debug!("Cache key for {}: {}", package_dir.display(), key);

        if self.restore(&key, &package_dir).await? {
            let after = fingerprint(&package_dir, &walk_options(FingerprintMode::Full)).await?;
            marker
                .write(&InstallMetadata::new(before, after, key, InstallSource::Cache))
                .await?;
            info!("Installed from cache");
            return Ok(InstallOutcome::RestoredFromCache);
        }

        link_dependencies(&package_dir, &self.options.link_sources, self.options.link).await?;
        self.installer
            .install(&package_dir, &self.options.args)
            .await?;

        let after = fingerprint(&package_dir, &walk_options(FingerprintMode::Full)).await?;
        self.snapshot(&key, &package_dir, &before, &after).await?;

        marker
            .write(&InstallMetadata::new(before, after, key, InstallSource::Installer))
            .await?;
        info!("Installed: {}", package_dir.display());
        Ok(InstallOutcome::Installed)
    }

    /// Restore both halves of the key; a hit needs both
    async fn restore(&self, key: &InstallCacheKey, package_dir: &Path) -> SmiResult<bool> {
        let dependencies = self.store.restore_dependencies(key, package_dir).await?;
        let changes = self.store.restore_changes(key, package_dir).await?;
        debug!(
            "Cache lookup: dependencies {}, changes {}",
            hit_or_miss(dependencies),
            hit_or_miss(changes)
        );
        Ok(dependencies && changes)
    }

    async fn snapshot(
        &self,
        key: &InstallCacheKey,
        package_dir: &Path,
        before: &DirTreeSnapshot,
        after: &DirTreeSnapshot,
    ) -> SmiResult<()> {
        info!("Creating snapshot for: {}", package_dir.display());

        // Files removed by the install are not tracked; a restore never deletes.
        let changed: Vec<String> = after
            .changed_since(before)
            .into_iter()
            .filter(|p| !is_dependency_path(p))
            .collect();
        debug!("{} paths changed outside {}", changed.len(), DEPENDENCY_DIR);

        let results = [
            (
                EntryKind::Dependencies,
                self.store.store_dependencies(key, package_dir).await,
            ),
            (
                EntryKind::Changes,
                self.store.store_changes(key, package_dir, &changed).await,
            ),
        ];

        for (kind, result) in results {
            match result {
                Ok(StoreOutcome::Stored) => debug!("Cached {} for {}", kind, key),
                Ok(StoreOutcome::AlreadyCached) => debug!("{} already cached for {}", kind, key),
                Ok(StoreOutcome::Skipped) => debug!("Nothing to cache for {}", kind),
                Err(e) if e.is_cache_write_recoverable() => {
                    warn!("Failed to cache {} for {}: {}", kind, package_dir.display(), e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Link dependencies available from the package's surroundings into it
///
/// The lookup starts at the package's parent, then at each of `sources`.
pub async fn link_dependencies(
    package_dir: &Path,
    sources: &[PathBuf],
    options: LinkOptions,
) -> SmiResult<LinkReport> {
    let mut starts = Vec::with_capacity(sources.len() + 1);
    if let Some(parent) = package_dir.parent() {
        starts.push(parent.to_path_buf());
    }
    // The ancestor walk needs absolute starts
    for source in sources {
        match fs::canonicalize(source).await {
            Ok(path) => starts.push(path),
            Err(e) => warn!("Ignoring link source {}: {}", source.display(), e),
        }
    }

    let available = locate_all(&starts).await?;
    debug!("{} packages available for linking", available.len());
    link_available(package_dir, &available, options).await
}

/// Derive the key of a package and report its cache and install state
pub async fn inspect(store: &CacheStore, package_dir: &Path) -> SmiResult<InstallStatus> {
    let package_dir = canonical(package_dir).await?;
    let descriptor = PackageDescriptor::from_dir(&package_dir).await?;
    let before = fingerprint(&package_dir, &walk_options(FingerprintMode::DeclarationOnly)).await?;
    let key = InstallCacheKey::derive(&before, &descriptor)?;

    let marker = MetadataStore::for_package(&package_dir);

    Ok(InstallStatus {
        installed: is_installed(&package_dir).await,
        dependencies_cached: store.contains(&key, EntryKind::Dependencies).await,
        changes_cached: store.contains(&key, EntryKind::Changes).await,
        metadata: marker.read().await?,
        marker: marker.path().to_path_buf(),
        name: descriptor.name,
        key,
        package_dir,
    })
}

/// Report, for each directory, whether it has a dependency tree
pub async fn is_installed_many(dirs: &[PathBuf]) -> Vec<(PathBuf, bool)> {
    join_all(dirs.iter().map(|dir| async move {
        let present = fs::try_exists(dir.join(DEPENDENCY_DIR)).await.unwrap_or(false);
        (dir.clone(), present)
    }))
    .await
}

fn walk_options(mode: FingerprintMode) -> FingerprintOptions {
    FingerprintOptions::new(mode).ignoring(MARKER_FILE)
}

fn hit_or_miss(hit: bool) -> &'static str {
    if hit {
        "hit"
    } else {
        "miss"
    }
}

/// Canonical form of an existing package directory
pub(crate) async fn canonical(path: &Path) -> SmiResult<PathBuf> {
    fs::canonicalize(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            SmiError::PathNotFound(path.to_path_buf())
        } else {
            SmiError::io(format!("resolving {}", path.display()), e)
        }
    })
}
