//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Scrip - Go scripts without the ceremony
///
/// Wraps a snippet of Go into a program, compiles it once into a cache
/// shared by every scrip process, and runs the cached binary.
#[derive(Parser, Debug)]
#[command(name = "scrip")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(long, global = true, env = "SCRIP_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile (if needed) and run a script
    Run(RunArgs),

    /// Inspect and maintain the build cache
    Cache(CacheArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Where the Go code comes from
#[derive(Args, Debug, Clone, Default)]
pub struct ScriptSource {
    /// Extra import, e.g. `strings` or `j encoding/json` (repeatable)
    #[arg(short, long = "import", value_name = "IMPORT")]
    pub imports: Vec<String>,

    /// Go code to run instead of a script file
    #[arg(short = 'c', long, value_name = "CODE")]
    pub code: Option<String>,

    /// Script file (shebang: #!/usr/bin/env -S scrip run)
    pub script: Option<PathBuf>,
}

/// Arguments for the run command
///
/// Flags are only read before the script path. Every token after it,
/// flag-shaped or not, belongs to the script, so a shebang line can pass
/// `-f` or `-v` through untouched.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Rebuild even if a compiled program is cached
    #[arg(short, long)]
    pub force: bool,

    /// Keep the build directory when compilation fails
    #[arg(short, long)]
    pub keep: bool,

    /// Extra import, e.g. `strings` or `j encoding/json` (repeatable)
    #[arg(short, long = "import", value_name = "IMPORT")]
    pub imports: Vec<String>,

    /// Go code to run instead of a script file
    #[arg(short = 'c', long, value_name = "CODE")]
    pub code: Option<String>,

    /// Script file followed by its arguments (all arguments with -c)
    #[arg(value_name = "SCRIPT", trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl RunArgs {
    /// Split the command line into the script source and the script's arguments
    pub fn into_parts(self) -> (ScriptSource, Vec<String>) {
        let mut args = self.command;
        let script = match self.code {
            Some(_) => None,
            None if args.is_empty() => None,
            None => Some(PathBuf::from(args.remove(0))),
        };

        let source = ScriptSource {
            imports: self.imports,
            code: self.code,
            script,
        };
        (source, args)
    }
}

/// Arguments for the config command
#[derive(Args, Debug)]
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

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.gc_days)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Output format for list command
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
#[derive(Args, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached programs
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show the cache key and state for a script
    Info(ScriptSource),

    /// Remove programs unused for longer than the reclamation window
    Gc {
        /// Remove programs unused for more than N days (default: from config)
        #[arg(long)]
        days: Option<u32>,

        /// Dry run - show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Reset a lease left behind by a crashed process
    Unlock {
        /// Cache key (as shown by `scrip cache list`)
        key: String,
    },

    /// Report program directories without a registry entry
    Verify,

    /// Remove every program that is not in use
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
