//! Package descriptor (`package.json`) reading
//!
//! Only the dependency declarations are extracted. They are normalized into
//! groups keyed by dependency type, in a fixed type order so that "first type
//! wins" is well defined when a name is declared more than once.

use crate::error::{SmiError, SmiResult};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Descriptor file name
pub const DESCRIPTOR_FILE: &str = "package.json";

/// Dependency groupings, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DependencyType {
    #[serde(rename = "dependencies")]
    Runtime,
    #[serde(rename = "devDependencies")]
    Development,
    #[serde(rename = "optionalDependencies")]
    Optional,
    #[serde(rename = "peerDependencies")]
    Peer,
}

impl DependencyType {
    /// All types in precedence order
    pub fn all() -> &'static [Self] {
        &[Self::Runtime, Self::Development, Self::Optional, Self::Peer]
    }

    /// Key used in package.json
    pub fn key(&self) -> &'static str {
        match self {
            Self::Runtime => "dependencies",
            Self::Development => "devDependencies",
            Self::Optional => "optionalDependencies",
            Self::Peer => "peerDependencies",
        }
    }
}

/// Normalized dependency declarations of one descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dependencies {
    /// type -> (name -> constraint)
    pub groups: BTreeMap<DependencyType, BTreeMap<String, String>>,
}

impl Dependencies {
    /// Distinct dependency names, first declaring type wins
    pub fn unique_names(&self) -> Vec<(&str, DependencyType)> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for ty in DependencyType::all() {
            if let Some(group) = self.groups.get(ty) {
                for name in group.keys() {
                    if seen.insert(name.as_str()) {
                        names.push((name.as_str(), *ty));
                    }
                }
            }
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.groups.values().all(BTreeMap::is_empty)
    }

    /// SHA256 over the canonical serialization of name + constraint per type
    pub fn hash(&self) -> SmiResult<String> {
        let serialized = serde_json::to_vec(&self.groups)?;
        Ok(hex::encode(Sha256::digest(&serialized)))
    }
}

/// A parsed descriptor
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    pub path: PathBuf,
    pub name: Option<String>,
    pub dependencies: Dependencies,
}

impl PackageDescriptor {
    /// Directory holding the descriptor
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Read and parse a descriptor file
    pub async fn from_file(path: &Path) -> SmiResult<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| SmiError::io(format!("reading descriptor {}", path.display()), e))?;
        Self::parse(path, &content)
    }

    /// Read the descriptor inside a package directory
    pub async fn from_dir(dir: &Path) -> SmiResult<Self> {
        let path = dir.join(DESCRIPTOR_FILE);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(SmiError::DescriptorMissing(dir.to_path_buf()));
        }
        Self::from_file(&path).await
    }

    /// Parse descriptor content
    pub fn parse(path: &Path, content: &str) -> SmiResult<Self> {
        let parse_err = |reason: String| SmiError::DescriptorParse {
            path: path.to_path_buf(),
            reason,
        };

        let value: Value = serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| parse_err("top level is not an object".to_string()))?;

        let name = object.get("name").and_then(Value::as_str).map(str::to_string);

        let mut dependencies = Dependencies::default();
        for ty in DependencyType::all() {
            let Some(group) = object.get(ty.key()) else {
                continue;
            };
            let group = group
                .as_object()
                .ok_or_else(|| parse_err(format!("'{}' is not an object", ty.key())))?;

            let mut normalized = BTreeMap::new();
            for (dep_name, constraint) in group {
                let constraint = match constraint {
                    Value::String(s) => s.clone(),
                    other => {
                        return Err(parse_err(format!(
                            "constraint for '{}' in '{}' is not a string: {}",
                            dep_name,
                            ty.key(),
                            other
                        )))
                    }
                };
                normalized.insert(dep_name.clone(), constraint);
            }
            if !normalized.is_empty() {
                dependencies.groups.insert(*ty, normalized);
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            name,
            dependencies,
        })
    }
}
