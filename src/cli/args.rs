//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// smi - cached npm installs
///
/// Links dependencies already installed elsewhere in the workspace and
/// restores previous installs from a content-addressed cache.
#[derive(Parser, Debug)]
#[command(name = "smi")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Increase verbosity (-v info and installer output, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SMI_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cache root (overrides config and SMI_CACHE_DIRPATH)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Cache epoch (overrides config and SMI_CACHE_EPOCH)
    #[arg(long, global = true)]
    pub epoch: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install a package's dependencies, from cache when possible
    Install(InstallArgs),

    /// Link available dependencies for every package.json below a package
    Relink(RelinkArgs),

    /// Show the cache key and install state of a package
    Info(InfoArgs),

    /// Manage the install cache
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the install command
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Package directory (defaults to current directory)
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Also reuse packages installed under this directory or its ancestors
    #[arg(long = "link-from", value_name = "DIR")]
    pub link_from: Vec<PathBuf>,

    /// Kill the installer after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Link with absolute symlink targets
    #[arg(long)]
    pub absolute_links: bool,

    /// Arguments passed to the installer after `install`
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Arguments for the relink command
#[derive(Parser, Debug)]
pub struct RelinkArgs {
    /// Package directory (defaults to current directory)
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Also reuse packages installed under this directory or its ancestors
    #[arg(long = "link-from", value_name = "DIR")]
    pub link_from: Vec<PathBuf>,

    /// Link with absolute symlink targets
    #[arg(long)]
    pub absolute_links: bool,
}

/// Arguments for the info command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Package directories (defaults to current directory)
    #[arg(short, long)]
    pub path: Vec<PathBuf>,
}

/// Output format for list commands
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List entries in the current epoch
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Print the directory of the current epoch
    Path,

    /// Remove every entry in the current epoch
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}
