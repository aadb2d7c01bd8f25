use crate::config::REGISTRY_ENV;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "safebump",
    about = "Safe npm dependency updates with snapshots, automatic rollback and sandboxed trials",
    version,
    author
)]
pub struct Cli {
    /// Path to the project directory (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    pub path: String,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// npm registry to query instead of registry.npmjs.org
    #[arg(long, env = REGISTRY_ENV, value_name = "URL", global = true)]
    pub registry: Option<String>,

    /// Judge test and type-check runs by exit status only, ignoring
    /// "failed" / "error" markers in their output
    #[arg(long, global = true)]
    pub strict_exit_status: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available updates grouped by risk
    Analyze {
        /// Only show updates for packages with known vulnerabilities
        #[arg(long)]
        security: bool,
    },

    /// Update dependencies with a snapshot and automatic rollback
    Update {
        /// Review every update before applying it
        #[arg(short, long)]
        interactive: bool,

        /// Only update packages with known vulnerabilities
        #[arg(long)]
        security: bool,

        /// Only apply patch updates
        #[arg(long)]
        safe: bool,

        /// Apply every available update without per-package prompts
        #[arg(long)]
        all: bool,

        /// Only update the named packages
        #[arg(long, value_delimiter = ',', value_name = "NAMES")]
        packages: Vec<String>,

        /// Filter packages by name using glob syntax (e.g. "@types/*")
        #[arg(long, value_name = "GLOB")]
        filter: Option<String>,

        /// Do not ask for confirmation before applying
        #[arg(short, long)]
        yes: bool,
    },

    /// Try a single package update on a disposable git branch
    Test {
        /// Package and version to try (e.g. axios@1.6.0)
        #[arg(value_name = "NAME@VERSION")]
        package: String,
    },

    /// Restore package.json and package-lock.json from a snapshot
    Rollback {
        /// Snapshot to restore (prompts when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// List snapshots, optionally pruning old ones
    Snapshots {
        /// Delete all but the newest N snapshots
        #[arg(long, value_name = "N")]
        prune_keep: Option<usize>,
    },

    /// Show registry information and where a package comes from
    Why {
        /// Package name
        #[arg(value_name = "NAME")]
        package: String,
    },
}
