//! smi - cached installs for npm packages
//!
//! Links dependencies already present elsewhere in a workspace and snapshots
//! what an install produced, so the next install with the same inputs is a
//! copy instead of a package-manager run.

pub mod cache;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fingerprint;
pub mod install;
pub mod link;

pub use error::{SmiError, SmiResult};
