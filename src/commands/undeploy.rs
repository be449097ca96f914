//! The `undeploy` subcommand.

use anyhow::Result;
use tracing::info;

use crate::cli::{GlobalOpts, UndeployOpts};
use crate::config;
use crate::engine::Engine;

/// Run the undeploy command.
///
/// # Errors
///
/// Returns an error when a package's deployment cannot be undone.
pub fn run(global: &GlobalOpts, opts: &UndeployOpts) -> Result<()> {
    let root = super::resolve_root(global)?;
    let registry = super::open_registry(global, &root)?;
    config::seed_registry(&registry, &root)?;
    let engine = Engine::new(&registry, &root, &opts.target);

    for package in &opts.packages {
        let removed = engine.undeploy_package(package)?;
        if removed {
            info!("{package}: artifacts removed");
        } else {
            info!("{package}: nothing to remove");
        }
    }
    Ok(())
}
