//! Package availability lookup
//!
//! Walks from a starting directory up to the filesystem root and collects
//! every package already materialized in a `node_modules` directory along the
//! way. Closer directories take precedence: a name is never re-registered
//! once found.

use crate::error::{SmiError, SmiResult};
use crate::fingerprint::DEPENDENCY_DIR;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Length of the random suffix npm appends to in-flight package directories
const TEMP_SUFFIX_LEN: usize = 7;

/// Packages available for reuse, keyed by package name
#[derive(Debug, Clone, Default)]
pub struct AvailablePackages {
    packages: HashMap<String, PathBuf>,
}

impl AvailablePackages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.packages.get(name).map(PathBuf::as_path)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Register a candidate unless the name is already taken
    pub fn register(&mut self, name: impl Into<String>, path: PathBuf) -> bool {
        let name = name.into();
        if self.packages.contains_key(&name) {
            return false;
        }
        debug!("Available package {} at {}", name, path.display());
        self.packages.insert(name, path);
        true
    }

    /// Fold in another index; names already present are kept
    pub fn merge(&mut self, other: AvailablePackages) {
        for (name, path) in other.packages {
            self.register(name, path);
        }
    }
}

/// Collect available packages from `start` and each of its ancestors
pub async fn locate(start: &Path) -> SmiResult<AvailablePackages> {
    let mut available = AvailablePackages::new();
    let mut current = start.to_path_buf();

    loop {
        let candidate = current.join(DEPENDENCY_DIR);
        if is_dir(&candidate).await {
            scan_dependency_dir(&candidate, &mut available).await?;
        }

        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => break,
        }
    }

    Ok(available)
}

/// Locate from several starting points, earlier starts taking precedence
pub async fn locate_all(starts: &[PathBuf]) -> SmiResult<AvailablePackages> {
    let mut available = AvailablePackages::new();
    for start in starts {
        available.merge(locate(start).await?);
    }
    Ok(available)
}

async fn scan_dependency_dir(dir: &Path, available: &mut AvailablePackages) -> SmiResult<()> {
    let names = list_visible(dir).await?;

    for name in &names {
        if let Some(scope) = name.strip_prefix('@') {
            // Scoped packages sit one level deeper: @scope/name
            let scope_dir = dir.join(name);
            if !is_dir(&scope_dir).await {
                continue;
            }
            for inner in list_visible(&scope_dir).await? {
                available.register(format!("@{scope}/{inner}"), scope_dir.join(&inner));
            }
        } else {
            available.register(name.clone(), dir.join(name));
        }
    }

    // In-flight directories from an interrupted install count for their base name
    for name in &names {
        if let Some(base) = strip_temp_suffix(name) {
            available.register(base, dir.join(name));
        }
    }

    Ok(())
}

async fn list_visible(dir: &Path) -> SmiResult<Vec<String>> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| SmiError::io(format!("reading {}", dir.display()), e))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SmiError::io(format!("reading {}", dir.display()), e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        names.push(name);
    }
    names.sort();
    Ok(names)
}

/// `lodash-a1B2c3d` -> `lodash`
fn strip_temp_suffix(name: &str) -> Option<&str> {
    if name.len() <= TEMP_SUFFIX_LEN + 1 || !name.is_char_boundary(name.len() - TEMP_SUFFIX_LEN - 1) {
        return None;
    }
    let (base, suffix) = name.split_at(name.len() - TEMP_SUFFIX_LEN - 1);
    let suffix = suffix.strip_prefix('-')?;
    if suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(base)
    } else {
        None
    }
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}
