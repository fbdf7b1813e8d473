//! Cached package installs
//!
//! [`InstallCache`] drives a single install. The marker written by
//! [`MetadataStore`] lets a repeat call return without any hashing.

pub mod installer;
pub mod manager;
pub mod metadata;

pub use installer::{CommandInstaller, Installer};
pub use manager::{
    inspect, is_installed_many, link_dependencies, InstallCache, InstallOptions, InstallOutcome,
    InstallStatus,
};
pub use metadata::{is_installed, InstallMetadata, InstallSource, MetadataStore, MARKER_FILE};
