//! Relink command - link available dependencies without installing

use crate::cli::args::{GlobalArgs, RelinkArgs};
use crate::cli::commands::{link_options, link_sources, package_dir};
use crate::config::Config;
use crate::error::SmiResult;
use crate::install::link_dependencies;
use crate::install::manager::canonical;
use crate::link::DescriptorScope;
use console::style;

/// Execute the relink command
///
/// Every `package.json` below the package takes part, including the ones
/// inside its dependency tree.
pub async fn execute(args: RelinkArgs, _global: &GlobalArgs, config: &Config) -> SmiResult<()> {
    let dir = canonical(&package_dir(args.path)?).await?;

    let options = link_options(config, DescriptorScope::Recursive, args.absolute_links);
    let sources = link_sources(args.link_from, config);
    let report = link_dependencies(&dir, &sources, options).await?;

    println!(
        "{} Linked {} dependencies across {} package(s)",
        style("✓").green(),
        report.created + report.replaced,
        report.descriptors
    );
    if report.replaced > 0 {
        println!("  {} replaced existing copies", report.replaced);
    }
    if report.already_linked > 0 {
        println!("  {} already linked", report.already_linked);
    }
    if report.skipped_descriptors > 0 {
        println!(
            "  {} {} package.json file(s) could not be parsed",
            style("!").yellow(),
            report.skipped_descriptors
        );
    }

    Ok(())
}
