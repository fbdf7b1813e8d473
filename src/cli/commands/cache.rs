//! Cache command - inspect and clear the install cache

use crate::cache::{create_copier, CacheEntry, CacheStore};
use crate::cli::args::{CacheAction, CacheArgs, GlobalArgs, OutputFormat};
use crate::cli::commands::cache_settings;
use crate::config::Config;
use crate::error::SmiResult;
use console::style;
use std::io::{self, Write};

/// Execute the cache command
pub async fn execute(args: CacheArgs, global: &GlobalArgs, config: &Config) -> SmiResult<()> {
    let settings = cache_settings(global, config)?;
    let store = CacheStore::new(&settings, create_copier(config.cache.copy_backend));

    match args.action {
        CacheAction::List { format } => list_entries(&store, format).await,
        CacheAction::Path => {
            println!("{}", store.dir().display());
            Ok(())
        }
        CacheAction::Clear { yes } => clear_entries(&store, yes).await,
    }
}

/// List entries of the current epoch
async fn list_entries(store: &CacheStore, format: OutputFormat) -> SmiResult<()> {
    let entries = store.list().await?;

    match format {
        OutputFormat::Table => print_entry_table(store, &entries),
        OutputFormat::Json => print_entry_json(&entries)?,
        OutputFormat::Plain => print_entry_plain(&entries),
    }

    Ok(())
}

fn print_entry_table(store: &CacheStore, entries: &[CacheEntry]) {
    if entries.is_empty() {
        println!("No cache entries in {}.", store.dir().display());
        return;
    }

    println!("{:<68} {:<14}", "HASH", "KIND");
    println!("{}", "-".repeat(82));

    for entry in entries {
        println!("{:<68} {:<14}", entry.hash, entry.kind.to_string());
    }

    println!();
    println!("Total: {} entr(ies)", entries.len());
}

fn print_entry_json(entries: &[CacheEntry]) -> SmiResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson<'a> {
        name: &'a str,
        hash: &'a str,
        kind: String,
        path: String,
    }

    let json_entries: Vec<EntryJson<'_>> = entries
        .iter()
        .map(|e| EntryJson {
            name: &e.name,
            hash: &e.hash,
            kind: e.kind.to_string(),
            path: e.path.display().to_string(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json_entries)?);
    Ok(())
}

fn print_entry_plain(entries: &[CacheEntry]) {
    for entry in entries {
        println!("{}", entry.name);
    }
}

/// Remove all entries of the current epoch
async fn clear_entries(store: &CacheStore, skip_confirm: bool) -> SmiResult<()> {
    let entries = store.list().await?;

    if entries.is_empty() {
        println!("No cache entries to clear.");
        return Ok(());
    }

    println!(
        "This will remove {} cache entr(ies) from {}",
        entries.len(),
        store.dir().display()
    );
    println!();

    if !skip_confirm {
        print!("Are you sure? [y/N] ");
        let _ = io::stdout().flush();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            println!("Failed to read input, aborting.");
            return Ok(());
        }

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let removed = store.clear().await?;
    println!("{} cleared {} cache entr(ies)", style("✓").green(), removed);

    Ok(())
}
