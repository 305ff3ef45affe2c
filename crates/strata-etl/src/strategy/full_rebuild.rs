//! Full rebuild: recompute every partition from the whole source corpus.

use super::{EtlEngine, RunReport, StrategyKind};
use crate::dedup::merge_partition;
use crate::error::Result;
use crate::partition::partition;

/// Runs the body of a full rebuild. The caller holds the run lock.
///
/// The namespace is cleared first, so partitions from an earlier run whose
/// dates no longer occur in the source do not survive. Prior state is gone
/// by the time partitions are written, so each is written with no merge.
pub(super) async fn execute(engine: &EtlEngine, report: &mut RunReport) -> Result<()> {
    let store = engine.partition_store(StrategyKind::FullRebuild);
    store.clear().await?;

    let files = engine.list_source_files().await?;
    tracing::info!(files = files.len(), "rebuilding from source");

    let mut rows = Vec::new();
    for file in &files {
        let decoded = engine.read_source(file).await?;
        tracing::debug!(file = %file, rows = decoded.len(), "source file decoded");
        report.record_file(decoded.len());
        rows.extend(decoded);
    }

    for (date, group) in partition(rows) {
        let Some(group) = engine.admit(report, date, group) else {
            continue;
        };
        let snapshot = merge_partition(None, group);
        store.write(date, &snapshot).await?;
        report.record_partition(snapshot.len());
    }
    Ok(())
}
