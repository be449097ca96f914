//! The `status` subcommand.

use anyhow::Result;

use crate::cli::{GlobalOpts, StatusOpts};
use crate::config;
use crate::engine::Engine;

/// Run the status command, printing the reconciled state to stdout.
///
/// # Errors
///
/// Returns an error when the content root or registry store is unusable;
/// reconciliation itself never fails.
pub fn run(global: &GlobalOpts, opts: &StatusOpts) -> Result<()> {
    let root = super::resolve_root(global)?;
    let registry = super::open_registry(global, &root)?;
    config::seed_registry(&registry, &root)?;
    let engine = Engine::new(&registry, &root, &opts.target);

    let package_config = engine.config_for(&opts.package);
    let report = engine.status_package(&package_config);
    match &report.detail {
        Some(detail) => println!("{}: {} ({detail})", opts.package, report.state),
        None => println!("{}: {}", opts.package, report.state),
    }
    Ok(())
}
