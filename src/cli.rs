use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use reconciler::Intent;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "converge")]
#[command(version)]
#[command(about = "Converge declared resources to their desired state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/converge/config.toml)
    #[arg(long, global = true, env = "CONVERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sandbox state file (default: ~/.local/state/converge/sandbox.json)
    #[arg(long, global = true, env = "CONVERGE_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate the manifest and show execution levels
    Plan(PlanArgs),

    /// Preview what apply or destroy would change
    Diff(DiffArgs),

    /// Create and update resources to match the manifest
    Apply(RunArgs),

    /// Delete the resources in the manifest, dependents first
    Destroy(RunArgs),

    /// List objects held by the sandbox provider
    State,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum IntentArg {
    Apply,
    Destroy,
}

impl From<IntentArg> for Intent {
    fn from(arg: IntentArg) -> Self {
        match arg {
            IntentArg::Apply => Intent::Apply,
            IntentArg::Destroy => Intent::Destroy,
        }
    }
}

#[derive(Args, Clone, Debug)]
pub struct ManifestArgs {
    /// Manifest file or directory of *.toml manifests
    #[arg(short, long, default_value = "converge.toml")]
    pub file: PathBuf,
}

#[derive(Args, Clone, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Order for apply or for destroy
    #[arg(long, value_enum, default_value_t = IntentArg::Apply)]
    pub intent: IntentArg,

    /// Only plan these targets (kind or kind/name, repeatable)
    #[arg(short, long)]
    pub target: Vec<String>,

    /// Print levels as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Clone, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Preview apply or destroy
    #[arg(long, value_enum, default_value_t = IntentArg::Apply)]
    pub intent: IntentArg,

    /// Only diff these targets (kind or kind/name, repeatable)
    #[arg(short, long)]
    pub target: Vec<String>,

    /// Number of parallel reads
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Read and classify only, change nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Number of resources handled in parallel within a level
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Maximum attempts per action for transient failures
    #[arg(short, long)]
    pub retries: Option<u32>,

    /// Per-action timeout in seconds (0 disables)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Only act on these targets (kind or kind/name, repeatable)
    #[arg(short, long)]
    pub target: Vec<String>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}
