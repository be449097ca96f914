//! The `resolve` subcommand.

use anyhow::Result;
use tracing::warn;

use crate::cli::{GlobalOpts, ResolveOpts};
use crate::config;
use crate::engine::Engine;

/// Run the resolve command, printing the deploy order to stdout.
///
/// # Errors
///
/// Returns an error when the content root or registry store is unusable.
pub fn run(global: &GlobalOpts, opts: &ResolveOpts) -> Result<()> {
    let root = super::resolve_root(global)?;
    let registry = super::open_registry(global, &root)?;
    config::seed_registry(&registry, &root)?;
    // Resolution never touches targets; the content root stands in.
    let engine = Engine::new(&registry, &root, &root);

    let resolved = engine.resolve_dependencies(&opts.packages);
    for warning in &resolved.warnings {
        warn!("{warning}");
    }
    for package in &resolved.order {
        println!("{package}");
    }
    Ok(())
}
