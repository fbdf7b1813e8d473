//! CLI command implementations

pub mod cache;
pub mod config;
pub mod info;
pub mod install;
pub mod relink;

pub use cache::execute as cache;
pub use config::execute as config;
pub use info::execute as info;
pub use install::execute as install;
pub use relink::execute as relink;

use crate::cli::args::GlobalArgs;
use crate::config::{CacheSettings, Config};
use crate::error::{SmiError, SmiResult};
use crate::link::{DescriptorScope, LinkOptions};
use std::env;
use std::path::PathBuf;

/// Cache location from flags, config and environment
fn cache_settings(global: &GlobalArgs, config: &Config) -> SmiResult<CacheSettings> {
    CacheSettings::from_env(global.cache_dir.clone(), global.epoch.clone(), config)
}

/// Explicit path, or the current directory
fn package_dir(path: Option<PathBuf>) -> SmiResult<PathBuf> {
    match path {
        Some(p) => Ok(p),
        None => env::current_dir().map_err(|e| SmiError::io("getting current directory", e)),
    }
}

fn link_options(config: &Config, scope: DescriptorScope, absolute: bool) -> LinkOptions {
    LinkOptions {
        scope,
        relative: config.install.relative_links && !absolute,
    }
}

/// Flag-supplied sources first, then configured ones
fn link_sources(flags: Vec<PathBuf>, config: &Config) -> Vec<PathBuf> {
    flags
        .into_iter()
        .chain(config.install.link_sources.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_flag_overrides_relative_config() {
        let config = Config::default();
        assert!(link_options(&config, DescriptorScope::Root, false).relative);
        assert!(!link_options(&config, DescriptorScope::Root, true).relative);
    }

    #[test]
    fn flag_sources_come_first() {
        let mut config = Config::default();
        config.install.link_sources = vec![PathBuf::from("/configured")];

        let sources = link_sources(vec![PathBuf::from("/flag")], &config);

        assert_eq!(sources, vec![PathBuf::from("/flag"), PathBuf::from("/configured")]);
    }

    #[test]
    fn explicit_package_dir_is_kept() {
        assert_eq!(
            package_dir(Some(PathBuf::from("/pkg"))).unwrap(),
            PathBuf::from("/pkg")
        );
    }
}
