//! Cache key derivation
//!
//! A package's install is addressed by two independent hashes:
//! - `paths_hash`: the package's own files (size only, dependency tree excluded)
//! - `dependencies_hash`: its normalized dependency declarations
//!
//! Packages declaring identical dependencies share one dependency-tree entry
//! even when their own sources differ.

use crate::descriptor::PackageDescriptor;
use crate::error::SmiResult;
use crate::fingerprint::DirTreeSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of hex chars shown in log lines
const SHORT_LEN: usize = 12;

/// Kind of cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Full copy of the dependency tree
    Dependencies,
    /// Non-dependency paths created or changed by an install
    Changes,
}

impl EntryKind {
    /// Directory name suffix
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Dependencies => "dependencies",
            Self::Changes => "changes",
        }
    }

    /// Parse an entry directory name into (hash, kind)
    pub fn parse_dir_name(name: &str) -> Option<(&str, Self)> {
        let (hash, suffix) = name.rsplit_once('-')?;
        if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let kind = match suffix {
            "dependencies" => Self::Dependencies,
            "changes" => Self::Changes,
            _ => return None,
        };
        Some((hash, kind))
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

/// Split cache key for one package install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallCacheKey {
    pub paths_hash: String,
    pub dependencies_hash: String,
}

impl InstallCacheKey {
    /// Derive from a declaration-only fingerprint and the package descriptor
    pub fn derive(before: &DirTreeSnapshot, descriptor: &PackageDescriptor) -> SmiResult<Self> {
        Ok(Self {
            paths_hash: before.hash.clone(),
            dependencies_hash: descriptor.dependencies.hash()?,
        })
    }

    /// Hash addressing the given entry kind
    pub fn hash_for(&self, kind: EntryKind) -> &str {
        match kind {
            EntryKind::Dependencies => &self.dependencies_hash,
            EntryKind::Changes => &self.paths_hash,
        }
    }

    /// Directory name of the entry for `kind`
    pub fn entry_name(&self, kind: EntryKind) -> String {
        format!("{}-{}", self.hash_for(kind), kind.suffix())
    }
}

impl fmt::Display for InstallCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "paths:{} deps:{}",
            short(&self.paths_hash),
            short(&self.dependencies_hash)
        )
    }
}

fn short(hash: &str) -> &str {
    &hash[..SHORT_LEN.min(hash.len())]
}
