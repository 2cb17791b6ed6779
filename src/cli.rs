use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;

#[derive(Parser)]
#[command(name = "nodeup")]
#[command(version)]
#[command(about = "Converge a node toward its declared configuration", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Node configuration file (.toml or .json)
    #[arg(short, long, global = true, env = "NODEUP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// Filesystem root to converge
    #[arg(long, global = true, default_value = "/")]
    pub root: PathBuf,

    /// Distribution, instead of reading /etc/os-release
    #[arg(long, global = true)]
    pub distribution: Option<String>,

    /// Architecture, instead of the one nodeup was built for
    #[arg(long, global = true)]
    pub architecture: Option<String>,

    /// Where downloaded artifacts are cached
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan(PlanArgs),

    /// Converge the node
    Apply(ApplyArgs),

    /// Write the plan as a declarative resource document
    Render(RenderArgs),

    /// Inspect the artifact catalog
    #[command(subcommand)]
    Artifacts(ArtifactsCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct PlanArgs {
    /// Only show tasks matching KIND or KIND/name
    pub target: Option<String>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Maximum number of tasks applied at once
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Report what would change without changing it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct RenderArgs {
    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum ArtifactsCommand {
    /// List every catalog record
    List,

    /// Show the records selected for a platform and version
    #[command(disable_version_flag = true)]
    Select {
        /// containerd version
        #[arg(long)]
        version: String,
    },

    /// Download and verify the selected artifacts into the cache
    #[command(disable_version_flag = true)]
    Fetch {
        /// containerd version, defaults to the configured one
        #[arg(long)]
        version: Option<String>,

        /// Parallel downloads
        #[arg(short, long, default_value = "4")]
        jobs: usize,
    },
}
