//! Incremental: fold source files missing from the ledger into partitions.

use super::{EtlEngine, RunReport, StrategyKind};
use crate::coordinator::RunCoordinator;
use crate::dedup::{dedup, merge_partition};
use crate::error::Result;
use crate::metrics;
use crate::partition::partition;

/// Runs the body of an incremental run. The caller holds the run lock.
///
/// Files are processed one at a time in listing order. A file is recorded in
/// the ledger only after every partition it touches has been rewritten, so a
/// failure part-way through leaves it to be reprocessed by the next run.
pub(super) async fn execute(
    engine: &EtlEngine,
    coordinator: &RunCoordinator,
    report: &mut RunReport,
) -> Result<()> {
    let store = engine.partition_store(StrategyKind::Incremental);
    let mut ledger = coordinator.read_ledger().await?;
    let files = engine.list_source_files().await?;

    let pending: Vec<&String> = files.iter().filter(|f| !ledger.contains(f)).collect();
    report.files_skipped = files.len() - pending.len();
    metrics::record_files_skipped(StrategyKind::Incremental.as_str(), report.files_skipped as u64);
    tracing::info!(
        files = files.len(),
        pending = pending.len(),
        ledger_entries = ledger.len(),
        "incremental run planned"
    );

    for file in pending {
        let decoded = engine.read_source(file).await?;
        let rows_read = decoded.len();
        let incoming = dedup(decoded);

        for (date, group) in partition(incoming) {
            let Some(group) = engine.admit(report, date, group) else {
                continue;
            };
            let existing = store.read(date).await?.into_rows();
            let merged = merge_partition(existing, group);
            store.write(date, &merged).await?;
            report.record_partition(merged.len());
        }

        coordinator.record_processed(&mut ledger, file).await?;
        report.record_file(rows_read);
        tracing::info!(file = %file, rows = rows_read, "source file merged");
    }
    Ok(())
}
