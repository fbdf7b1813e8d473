//! Directory tree fingerprinting
//!
//! Walks a package directory and records size and modification time for
//! every file. The resulting snapshot carries a SHA256 digest over a
//! canonical (sorted) serialization of the hashed paths, so two walks of the
//! same contents always agree regardless of traversal order.
//!
//! The dependency tree (`node_modules`) is walked and reported in `paths` but
//! never contributes to the hash.

use crate::error::{SmiError, SmiResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::debug;
use walkdir::WalkDir;

/// Name of the dependency tree directory inside a package
pub const DEPENDENCY_DIR: &str = "node_modules";

/// What goes into the hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintMode {
    /// Size and modification time; detects what an install touched
    Full,
    /// Size only; stable across timestamp churn
    DeclarationOnly,
}

/// Recorded state of a single path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub size: u64,
    /// Nanoseconds since the unix epoch, when the platform reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<u64>,
}

/// Aggregate counters for a walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSummary {
    pub files: u64,
    pub total_size: u64,
    /// Files under the dependency tree (counted but not hashed)
    pub dependency_files: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest_mtime: Option<u64>,
}

/// A hashable description of a directory's file state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirTreeSnapshot {
    /// Relative '/'-separated path to entry
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub paths: BTreeMap<String, PathEntry>,
    pub summary: TreeSummary,
    pub mode: FingerprintMode,
    pub hash: String,
}

impl DirTreeSnapshot {
    /// Drop the per-path detail, keeping summary and hash
    pub fn stripped(mut self) -> Self {
        self.paths.clear();
        self
    }

    /// Paths present here that are new or differ in size or mtime from `before`
    pub fn changed_since(&self, before: &DirTreeSnapshot) -> Vec<String> {
        self.paths
            .iter()
            .filter(|(path, entry)| match before.paths.get(*path) {
                Some(old) => old.size != entry.size || old.mtime != entry.mtime,
                None => true,
            })
            .map(|(path, _)| path.clone())
            .collect()
    }
}

/// Options controlling a walk
#[derive(Debug, Clone)]
pub struct FingerprintOptions {
    pub mode: FingerprintMode,
    /// Relative paths skipped entirely (e.g. the metadata marker)
    pub ignore: Vec<String>,
}

impl FingerprintOptions {
    pub fn new(mode: FingerprintMode) -> Self {
        Self {
            mode,
            ignore: Vec::new(),
        }
    }

    pub fn ignoring(mut self, relative: impl Into<String>) -> Self {
        self.ignore.push(relative.into());
        self
    }
}

/// Whether a relative path lives inside the dependency tree
pub fn is_dependency_path(relative: &str) -> bool {
    relative == DEPENDENCY_DIR
        || relative
            .strip_prefix(DEPENDENCY_DIR)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Fingerprint a directory tree
///
/// The walk runs on the blocking pool. Any I/O error aborts the whole walk.
pub async fn fingerprint(root: &Path, options: &FingerprintOptions) -> SmiResult<DirTreeSnapshot> {
    let root = root.to_path_buf();
    let options = options.clone();
    tokio::task::spawn_blocking(move || fingerprint_blocking(&root, &options))
        .await
        .map_err(|e| SmiError::Internal(format!("fingerprint task failed: {e}")))?
}

fn fingerprint_blocking(root: &Path, options: &FingerprintOptions) -> SmiResult<DirTreeSnapshot> {
    let mut paths = BTreeMap::new();
    let mut summary = TreeSummary::default();

    let walker = WalkDir::new(root).follow_links(false).into_iter();
    for entry in walker.filter_entry(|e| !is_ignored(root, e.path(), &options.ignore)) {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let Some(relative) = relative_key(root, entry.path()) else {
            continue;
        };

        let metadata = fs::symlink_metadata(entry.path())
            .map_err(|e| SmiError::io(format!("reading metadata of {}", entry.path().display()), e))?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as u64);

        summary.files += 1;
        summary.total_size += metadata.len();
        summary.newest_mtime = summary.newest_mtime.max(mtime);
        if is_dependency_path(&relative) {
            summary.dependency_files += 1;
        }

        paths.insert(
            relative,
            PathEntry {
                size: metadata.len(),
                mtime,
            },
        );
    }

    let hash = hash_paths(&paths, options.mode)?;
    debug!(
        "Fingerprinted {} ({} files, mode {:?}): {}",
        root.display(),
        summary.files,
        options.mode,
        hash
    );

    Ok(DirTreeSnapshot {
        paths,
        summary,
        mode: options.mode,
        hash,
    })
}

/// Digest of the non-dependency paths.
///
/// BTreeMap serializes with sorted keys, which makes the input canonical.
fn hash_paths(paths: &BTreeMap<String, PathEntry>, mode: FingerprintMode) -> SmiResult<String> {
    let hashed = paths.iter().filter(|(path, _)| !is_dependency_path(path));

    let serialized = match mode {
        FingerprintMode::DeclarationOnly => {
            let sizes: BTreeMap<&str, u64> = hashed.map(|(p, e)| (p.as_str(), e.size)).collect();
            serde_json::to_vec(&sizes)?
        }
        FingerprintMode::Full => {
            let full: BTreeMap<&str, &PathEntry> = hashed.map(|(p, e)| (p.as_str(), e)).collect();
            serde_json::to_vec(&full)?
        }
    };

    Ok(hex::encode(Sha256::digest(&serialized)))
}

fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    if relative.as_os_str().is_empty() {
        return None;
    }
    Some(relative.to_string_lossy().replace('\\', "/"))
}

fn is_ignored(root: &Path, path: &Path, ignore: &[String]) -> bool {
    match relative_key(root, path) {
        Some(relative) => ignore.iter().any(|i| *i == relative),
        None => false,
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> SmiError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(root));
    match err.into_io_error() {
        Some(source) => SmiError::io(format!("walking {}", path.display()), source),
        None => SmiError::Internal(format!("filesystem loop while walking {}", path.display())),
    }
}
