//! ETL metrics.
//!
//! Counters and histograms recorded through the `metrics` facade. No
//! exporter is installed here; without a recorder every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};

// ============================================================================
// Source Metrics
// ============================================================================

/// Source files decoded and folded into partitions.
pub const FILES_PROCESSED: &str = "strata_files_processed_total";

/// Source files skipped because the ledger already lists them.
pub const FILES_SKIPPED: &str = "strata_files_skipped_total";

/// Rows decoded from source files.
pub const ROWS_READ: &str = "strata_rows_read_total";

// ============================================================================
// Partition Metrics
// ============================================================================

/// Partition snapshots written.
pub const PARTITIONS_WRITTEN: &str = "strata_partitions_written_total";

/// Rows written across partition snapshots.
pub const ROWS_WRITTEN: &str = "strata_rows_written_total";

/// Rows with an unparseable `c7`, by disposition.
pub const ROWS_UNPARSEABLE: &str = "strata_rows_unparseable_total";

// ============================================================================
// Run Metrics
// ============================================================================

/// Strategy runs by outcome.
pub const RUNS: &str = "strata_runs_total";

/// Run duration histogram.
pub const RUN_DURATION: &str = "strata_run_duration_seconds";

/// Registers all ETL metric descriptions.
///
/// Call this once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(FILES_PROCESSED, "Total source files processed");
    describe_counter!(FILES_SKIPPED, "Total source files skipped as already processed");
    describe_counter!(ROWS_READ, "Total rows decoded from source files");
    describe_counter!(PARTITIONS_WRITTEN, "Total partition snapshots written");
    describe_counter!(ROWS_WRITTEN, "Total rows written to partition snapshots");
    describe_counter!(ROWS_UNPARSEABLE, "Total rows with an unparseable c7 date");
    describe_counter!(RUNS, "Total strategy runs by outcome");
    describe_histogram!(RUN_DURATION, "Duration of strategy runs in seconds");
}

/// Records a processed source file.
pub fn record_file_processed(strategy: &str, rows: u64) {
    counter!(FILES_PROCESSED, "strategy" => strategy.to_string()).increment(1);
    counter!(ROWS_READ, "strategy" => strategy.to_string()).increment(rows);
}

/// Records source files skipped by the ledger.
pub fn record_files_skipped(strategy: &str, count: u64) {
    counter!(FILES_SKIPPED, "strategy" => strategy.to_string()).increment(count);
}

/// Records a partition write.
pub fn record_partition_written(strategy: &str, rows: u64) {
    counter!(PARTITIONS_WRITTEN, "strategy" => strategy.to_string()).increment(1);
    counter!(ROWS_WRITTEN, "strategy" => strategy.to_string()).increment(rows);
}

/// Records rows with an unparseable `c7` and what happened to them.
pub fn record_unparseable(strategy: &str, disposition: &str, rows: u64) {
    let labels = [
        ("strategy", strategy.to_string()),
        ("disposition", disposition.to_string()),
    ];
    counter!(ROWS_UNPARSEABLE, &labels).increment(rows);
}

/// Records the end of a run.
pub fn record_run(strategy: &str, outcome: &str, duration_secs: f64) {
    let labels = [
        ("strategy", strategy.to_string()),
        ("outcome", outcome.to_string()),
    ];
    counter!(RUNS, &labels).increment(1);
    histogram!(RUN_DURATION, &labels).record(duration_secs);
}
