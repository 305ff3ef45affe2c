//! Reset-ledger command - make the next incremental run reprocess everything.

use anyhow::{Context, Result};
use clap::Args;
use strata_etl::{EtlEngine, StrategyKind};

use crate::Config;

/// Arguments for the reset-ledger command.
#[derive(Debug, Args)]
pub struct ResetLedgerArgs {
    /// Confirm the reset.
    #[arg(long)]
    pub yes: bool,
}

/// Execute the reset-ledger command.
///
/// Refuses to run while the run lock is held.
///
/// # Errors
///
/// Returns an error if `--yes` is missing, the lock is held, or the ledger
/// cannot be deleted.
pub async fn execute(args: &ResetLedgerArgs, config: &Config) -> Result<()> {
    if !args.yes {
        anyhow::bail!("Resetting the ledger reprocesses every source file; pass --yes");
    }

    let engine =
        EtlEngine::from_config(config.etl.clone()).context("Failed to open configured stores")?;
    let coordinator = engine.coordinator(StrategyKind::Incremental);
    if coordinator.is_locked().await? {
        anyhow::bail!("A run holds the lock; retry when it finishes");
    }

    let before = coordinator.read_ledger().await?.len();
    coordinator.reset_ledger().await?;
    println!("Ledger {} reset ({before} entries removed)", coordinator.ledger_key());
    Ok(())
}
