//! The `sweep` subcommand.

use anyhow::Result;
use tracing::{error, info};

use crate::cli::{GlobalOpts, SweepOpts};
use crate::config;
use crate::engine::Engine;

/// Run the sweep command.
///
/// # Errors
///
/// Returns an error when any artifact could not be removed (siblings are
/// still processed first).
pub fn run(global: &GlobalOpts, opts: &SweepOpts) -> Result<()> {
    let root = super::resolve_root(global)?;
    let registry = super::open_registry(global, &root)?;
    config::seed_registry(&registry, &root)?;
    // The first target doubles as the engine's primary root; sweeping
    // itself spans all of them.
    let primary = opts.target.first().cloned().unwrap_or_else(|| root.clone());
    let engine = Engine::new(&registry, &root, primary);

    let package_config = engine.config_for(&opts.package);
    let source_root = engine.source_root_for(&package_config);
    let report = engine.sweep(&source_root, &opts.target);

    if report.any_removed {
        info!("{}: artifacts removed", opts.package);
    } else {
        info!("{}: nothing to remove", opts.package);
    }
    for path in &report.failed {
        error!("could not remove {}", path.display());
    }
    anyhow::ensure!(
        report.failed.is_empty(),
        "{} artifact(s) could not be removed",
        report.failed.len()
    );
    Ok(())
}
