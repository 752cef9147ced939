use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "shorewall")]
#[command(version)]
#[command(about = "Converge the shorewall firewall package and its configuration", long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to shorewall.toml in the config directory)
    #[arg(long, global = true, env = "SHOREWALL_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the resources that would be managed
    Plan(PlanArgs),

    /// Print the rendered configuration file
    Render(ParamArgs),

    /// Make the host match the plan
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Module parameters, layered over the config file
#[derive(Debug, Clone, Default, Args)]
pub struct ParamArgs {
    /// Node name used in templates (defaults to the host name)
    #[arg(long)]
    pub node: Option<String>,

    /// Exact package version to install
    #[arg(long = "version", value_name = "VERSION")]
    pub pkg_version: Option<String>,

    /// Remove the package and its configuration
    #[arg(long)]
    pub absent: bool,

    /// Compute changes without applying them
    #[arg(long)]
    pub noop: bool,

    /// Template for the configuration file (module/file)
    #[arg(long)]
    pub template: Option<String>,

    /// Template variable (repeatable)
    #[arg(long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Source URI for the configuration file
    #[arg(long)]
    pub source: Option<String>,

    /// Source URI for the configuration directory
    #[arg(long)]
    pub source_dir: Option<String>,

    /// Remove files in the configuration directory that are not in the source
    #[arg(long)]
    pub source_dir_purge: bool,

    /// Content provider class for the configuration file
    #[arg(long)]
    pub my_class: Option<String>,

    /// Node fact available to templates (repeatable)
    #[arg(long = "fact", value_name = "KEY=VALUE")]
    pub facts: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub params: ParamArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub params: ParamArgs,

    /// Only apply resources matching this target (e.g. "file", "package:shorewall")
    pub target: Option<String>,

    /// Show what would change without applying
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,
}
