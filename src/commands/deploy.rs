//! The `deploy` subcommand.

use anyhow::Result;
use tracing::info;

use crate::cli::{DeployOpts, GlobalOpts};
use crate::config;
use crate::engine::Engine;
use crate::executor::{ItemOutcome, ItemResult};

/// Run the deploy command.
///
/// # Errors
///
/// Returns an error on plan rejection (collision, safety violation), an
/// unforced tag conflict, or when any item failed to apply.
pub fn run(global: &GlobalOpts, opts: &DeployOpts) -> Result<()> {
    let root = super::resolve_root(global)?;
    let registry = super::open_registry(global, &root)?;
    config::seed_registry(&registry, &root)?;
    let engine = Engine::new(&registry, &root, &opts.target);

    if !opts.force {
        for package in &opts.packages {
            if let Some(conflict) = engine.check_tag_conflict(package) {
                anyhow::bail!(
                    "package '{package}' shares tag '{}' with active package '{}' \
                     ({} scope); pass --force to deploy anyway",
                    conflict.tag,
                    conflict.package,
                    conflict.scope
                );
            }
        }
    }

    let run = engine.deploy(&opts.packages)?;

    let mut failed_total = 0;
    for applied in &run.packages {
        let (ok, skipped, failed) = tally(&applied.results);
        failed_total += failed;
        info!(
            "{}: {ok} applied, {skipped} skipped, {failed} failed",
            applied.package
        );
        for item in &applied.results {
            if let ItemOutcome::Failed(e) = &item.outcome {
                tracing::error!("  {e}");
            }
        }
    }

    anyhow::ensure!(failed_total == 0, "{failed_total} item(s) failed to deploy");
    Ok(())
}

fn tally(results: &[ItemResult]) -> (usize, usize, usize) {
    let mut ok = 0;
    let mut skipped = 0;
    let mut failed = 0;
    for item in results {
        match &item.outcome {
            ItemOutcome::Applied => ok += 1,
            ItemOutcome::Skipped { .. } => skipped += 1,
            ItemOutcome::Failed(_) => failed += 1,
        }
    }
    (ok, skipped, failed)
}
