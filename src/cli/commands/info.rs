//! Info command - show cache key and install state

use crate::cache::{create_copier, CacheStore, EntryKind};
use crate::cli::args::{GlobalArgs, InfoArgs};
use crate::cli::commands::{cache_settings, package_dir};
use crate::config::Config;
use crate::error::SmiResult;
use crate::install::{inspect, is_installed_many, InstallStatus};
use console::style;
use std::path::PathBuf;

/// Execute the info command
pub async fn execute(args: InfoArgs, global: &GlobalArgs, config: &Config) -> SmiResult<()> {
    let settings = cache_settings(global, config)?;
    let store = CacheStore::new(&settings, create_copier(config.cache.copy_backend));

    let dirs = if args.path.is_empty() {
        vec![package_dir(None)?]
    } else {
        args.path
    };

    if dirs.len() > 1 {
        print_overview(&dirs).await;
        return Ok(());
    }

    for dir in &dirs {
        let status = inspect(&store, dir).await?;
        print_status(&store, &status);
    }
    Ok(())
}

/// One line per package: whether its dependency tree exists
async fn print_overview(dirs: &[PathBuf]) {
    println!("{:<60} {:<12}", "PACKAGE", "NODE_MODULES");
    println!("{}", "-".repeat(72));

    for (dir, present) in is_installed_many(dirs).await {
        let state = if present {
            style("present").green()
        } else {
            style("missing").dim()
        };
        println!("{:<60} {:<12}", dir.display(), state);
    }
}

fn print_status(store: &CacheStore, status: &InstallStatus) {
    println!("Package: {}", status.package_dir.display());
    if let Some(ref name) = status.name {
        println!("Name:    {}", name);
    }
    println!("Cache:   {}", store.dir().display());
    println!();

    let installed = if status.installed {
        style("yes").green()
    } else {
        style("no").yellow()
    };
    println!("Installed: {}", installed);
    if let Some(ref meta) = status.metadata {
        println!("  {} marker {}", style("•").cyan(), status.marker.display());
        println!(
            "  {} via {:?} at {}",
            style("•").cyan(),
            meta.source,
            meta.installed_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!();

    println!("Cache entries:");
    for (kind, cached) in [
        (EntryKind::Dependencies, status.dependencies_cached),
        (EntryKind::Changes, status.changes_cached),
    ] {
        let mark = if cached {
            style("✓").green()
        } else {
            style("○").dim()
        };
        println!(
            "  {} {:<13} {}",
            mark,
            kind.to_string(),
            status.key.entry_name(kind)
        );
    }
}
