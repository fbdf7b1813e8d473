//! Cross-package dependency linking
//!
//! Dependencies already materialized somewhere in the workspace are symlinked
//! into a package's `node_modules` before the installer runs, so it skips
//! them instead of fetching another copy.
//!
//! Installed versions are not checked against the declared constraints.

pub mod locate;
pub mod resolve;

pub use locate::{locate, locate_all, AvailablePackages};
pub use resolve::{
    discover_descriptors, link_available, relative_path, DescriptorScope, LinkOptions, LinkReport,
};
