//! Install command - install dependencies through the cache

use crate::cache::create_copier;
use crate::cli::args::{GlobalArgs, InstallArgs};
use crate::cli::commands::{cache_settings, link_options, link_sources, package_dir};
use crate::config::Config;
use crate::error::SmiResult;
use crate::install::{CommandInstaller, InstallCache, InstallOptions, InstallOutcome};
use crate::link::DescriptorScope;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Execute the install command
pub async fn execute(args: InstallArgs, global: &GlobalArgs, config: &Config) -> SmiResult<()> {
    // Fails before touching the filesystem when no cache root is configured
    let settings = cache_settings(global, config)?;
    let dir = package_dir(args.path)?;

    let scope = if config.install.transitive_links {
        DescriptorScope::Recursive
    } else {
        DescriptorScope::Root
    };
    let timeout = args
        .timeout
        .or(config.install.timeout_secs)
        .map(Duration::from_secs);

    let verbose = global.verbose > 0 || config.general.verbose;
    let installer = CommandInstaller::new(config.install.command.clone())
        .verbose(verbose)
        .timeout(timeout);

    let options = InstallOptions {
        args: config
            .install
            .args
            .iter()
            .cloned()
            .chain(args.args)
            .collect(),
        link: link_options(config, scope, args.absolute_links),
        link_sources: link_sources(args.link_from, config),
    };
    debug!("Install options: {:?}", options);

    let copier = create_copier(config.cache.copy_backend);
    debug!("Cache {} using {} copy", settings.epoch_dir().display(), copier.name());

    let cache = InstallCache::new(&settings, copier, Arc::new(installer), options);
    // Installer output and log lines would tear through the spinner
    let pb = if verbose {
        ProgressBar::hidden()
    } else {
        create_progress_bar(&format!("Installing {}...", dir.display()))
    };
    let result = cache.install(&dir).await;
    pb.finish_and_clear();
    let outcome = result?;

    let marker = match outcome {
        InstallOutcome::AlreadyInstalled => style("=").dim(),
        InstallOutcome::RestoredFromCache => style("✓").cyan(),
        InstallOutcome::Installed => style("✓").green(),
    };
    println!("{} {} ({})", marker, dir.display(), outcome);

    Ok(())
}

fn create_progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
