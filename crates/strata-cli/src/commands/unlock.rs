//! Unlock command - clear a run lock left by a crashed run.

use anyhow::{Context, Result};
use clap::Args;
use strata_etl::{EtlEngine, StrategyKind};

use crate::{Config, OutputFormat};

/// Arguments for the unlock command.
#[derive(Debug, Args)]
pub struct UnlockArgs {
    /// Confirm that no run is in progress.
    #[arg(long)]
    pub yes: bool,
}

/// Execute the unlock command.
///
/// # Errors
///
/// Returns an error if `--yes` is missing or the lock cannot be deleted.
pub async fn execute(args: &UnlockArgs, config: &Config) -> Result<()> {
    if !args.yes {
        anyhow::bail!("Unlocking while a run is active lets two runs write at once; pass --yes");
    }

    let engine =
        EtlEngine::from_config(config.etl.clone()).context("Failed to open configured stores")?;
    // The lock is shared, so either strategy's coordinator reaches it.
    let previous = engine
        .coordinator(StrategyKind::Incremental)
        .force_unlock()
        .await?;

    match config.format {
        OutputFormat::Json => {
            println!("{}", serde_json::json!({ "previousHolder": previous }));
        }
        OutputFormat::Text => match previous {
            Some(info) => println!(
                "Removed run lock held by {} since {}",
                info.holder_id,
                info.acquired_at.to_rfc3339()
            ),
            None => println!("Run lock removed (no readable holder)"),
        },
    }
    Ok(())
}
