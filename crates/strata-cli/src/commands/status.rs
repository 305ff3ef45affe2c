//! Status command - show lock and ledger state.

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;
use strata_etl::{EtlEngine, StrategyKind};

use crate::{Config, OutputFormat};

/// Arguments for the status command.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// List every ledger entry.
    #[arg(long, short = 'l')]
    pub ledger: bool,
}

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the lock or ledger cannot be read.
pub async fn execute(args: &StatusArgs, config: &Config) -> Result<()> {
    let engine =
        EtlEngine::from_config(config.etl.clone()).context("Failed to open configured stores")?;
    let coordinator = engine.coordinator(StrategyKind::Incremental);

    let locked = coordinator.is_locked().await?;
    let holder = if locked {
        coordinator.lock_info().await.unwrap_or(None)
    } else {
        None
    };
    let ledger = coordinator.read_ledger().await?;

    match config.format {
        OutputFormat::Json => {
            let mut value = serde_json::json!({
                "locked": locked,
                "lock": holder,
                "ledgerKey": coordinator.ledger_key().to_string(),
                "ledgerEntries": ledger.len(),
            });
            if args.ledger {
                value["ledger"] = ledger.iter().collect::<Vec<_>>().into();
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            if locked {
                println!("Run lock: {}", "held".yellow());
                if let Some(info) = &holder {
                    println!("  holder:    {}", info.holder_id);
                    println!("  since:     {}", info.acquired_at.to_rfc3339());
                    if let Some(operation) = &info.operation {
                        println!("  operation: {operation}");
                    }
                }
            } else {
                println!("Run lock: {}", "free".green());
            }
            println!(
                "Ledger {}: {} files processed",
                coordinator.ledger_key(),
                ledger.len()
            );
            if args.ledger {
                for entry in ledger.iter() {
                    println!("  {entry}");
                }
            }
        }
    }
    Ok(())
}
