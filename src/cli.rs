//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI entry point for the deployment engine.
#[derive(Parser, Debug)]
#[command(
    name = "packdeck",
    about = "Content package deployment and reconciliation engine",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Content library root (defaults to the current directory)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Registry store file (defaults to <root>/.packdeck/registry.json)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy packages (and their library dependencies) into a target
    Deploy(DeployOpts),
    /// Undo package deployments, restoring backups
    Undeploy(UndeployOpts),
    /// Reconcile and print the current state of a package's target
    Status(StatusOpts),
    /// Remove every artifact tracing back to a package across target roots
    Sweep(SweepOpts),
    /// Print the dependency-resolved deploy order
    Resolve(ResolveOpts),
}

/// Options for the `deploy` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct DeployOpts {
    /// Package paths (relative to the content root)
    #[arg(required = true)]
    pub packages: Vec<String>,

    /// Target directory to deploy into
    #[arg(short, long)]
    pub target: PathBuf,

    /// Deploy even when a tag conflict with an active package is detected
    #[arg(long)]
    pub force: bool,
}

/// Options for the `undeploy` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct UndeployOpts {
    /// Package paths (relative to the content root)
    #[arg(required = true)]
    pub packages: Vec<String>,

    /// Target directory the packages were deployed into
    #[arg(short, long)]
    pub target: PathBuf,
}

/// Options for the `status` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct StatusOpts {
    /// Package path (relative to the content root)
    pub package: String,

    /// Target directory the package deploys into
    #[arg(short, long)]
    pub target: PathBuf,
}

/// Options for the `sweep` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct SweepOpts {
    /// Package path (relative to the content root)
    pub package: String,

    /// Target roots to sweep (repeatable)
    #[arg(short, long, required = true)]
    pub target: Vec<PathBuf>,
}

/// Options for the `resolve` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct ResolveOpts {
    /// Package paths (relative to the content root)
    #[arg(required = true)]
    pub packages: Vec<String>,
}
