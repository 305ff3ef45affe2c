//! Run command - execute one or both strategies.

use anyhow::{Context, Result};
use clap::Args;
use owo_colors::OwoColorize;
use strata_etl::{EtlEngine, RunOutcome, StrategyKind};

use crate::{Config, OutputFormat};

/// Which strategies to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StrategyChoice {
    /// Full rebuild only.
    FullRebuild,
    /// Incremental only.
    Incremental,
    /// Full rebuild, then incremental.
    #[default]
    All,
}

impl StrategyChoice {
    fn kinds(self) -> &'static [StrategyKind] {
        match self {
            Self::FullRebuild => &[StrategyKind::FullRebuild],
            Self::Incremental => &[StrategyKind::Incremental],
            Self::All => &StrategyKind::ALL,
        }
    }
}

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Strategy to run.
    #[arg(long, value_enum, default_value_t = StrategyChoice::All)]
    pub strategy: StrategyChoice,
}

/// Execute the run command.
///
/// A run aborted by a held lock is reported but is not an error.
///
/// # Errors
///
/// Returns an error if the stores cannot be opened or any strategy failed.
pub async fn execute(args: &RunArgs, config: &Config) -> Result<()> {
    let engine =
        EtlEngine::from_config(config.etl.clone()).context("Failed to open configured stores")?;

    let mut failed = Vec::new();
    for &kind in args.strategy.kinds() {
        let outcome = engine.run(kind).await;
        print_outcome(kind, &outcome, config);
        if outcome.is_failed() {
            failed.push(kind.as_str());
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Strategy run failed: {}", failed.join(", "));
    }
    Ok(())
}

fn print_outcome(kind: StrategyKind, outcome: &RunOutcome, config: &Config) {
    match config.format {
        OutputFormat::Json => {
            let mut value = serde_json::json!({
                "strategy": kind.as_str(),
                "outcome": outcome.label(),
            });
            match outcome {
                RunOutcome::Completed(report) => {
                    value["runId"] = report.run_id.clone().into();
                    value["filesProcessed"] = report.files_processed.into();
                    value["filesSkipped"] = report.files_skipped.into();
                    value["rowsRead"] = report.rows_read.into();
                    value["partitionsWritten"] = report.partitions_written.into();
                    value["rowsWritten"] = report.rows_written.into();
                    value["rowsQuarantined"] = report.rows_quarantined.into();
                    value["rowsDropped"] = report.rows_dropped.into();
                    value["elapsedMs"] =
                        u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX).into();
                }
                RunOutcome::Aborted(reason) => value["reason"] = reason.to_string().into(),
                RunOutcome::Failed(error) => value["error"] = error.to_string().into(),
            }
            println!("{value}");
        }
        OutputFormat::Text => match outcome {
            RunOutcome::Completed(report) => {
                println!(
                    "{} {}: {} files processed, {} skipped, {} partitions written ({} rows)",
                    "completed".green(),
                    kind,
                    report.files_processed,
                    report.files_skipped,
                    report.partitions_written,
                    report.rows_written
                );
                if report.rows_quarantined > 0 || report.rows_dropped > 0 {
                    println!(
                        "  unparseable c7: {} quarantined, {} dropped",
                        report.rows_quarantined, report.rows_dropped
                    );
                }
            }
            RunOutcome::Aborted(reason) => println!("{} {kind}: {reason}", "aborted".yellow()),
            RunOutcome::Failed(error) => eprintln!("{} {kind}: {error}", "failed".red()),
        },
    }
}
