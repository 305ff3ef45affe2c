//! Failure injection tests for the strategy drivers.
//!
//! # Invariants Tested
//!
//! 1. **Ledger follows partitions**: a file is ledgered only after all of its
//!    partitions are written, so a failure in between leads to a full retry
//! 2. **Retry is idempotent**: reprocessing a file yields the same partition
//!    content as a clean run
//! 3. **Absent is not failed**: a partition read error aborts the run instead
//!    of being treated as an empty partition
//! 4. **Lock is always released** after a caught failure

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bytes::Bytes;
use strata_etl::{EtlError, RunOutcome, StrategyKind, storage_key};
use strata_test_utils::{
    EtlHarness, assert_unlocked, day, expected_record, ledger_entries, partition_paths,
    partition_rows, source_line,
};

const NS: &str = "incremental";
const LEDGER: &str = "_etl/incremental/processed_file_list";
const LOCK: &str = "_etl/lock";

fn failed(outcome: RunOutcome) -> EtlError {
    match outcome {
        RunOutcome::Failed(err) => err,
        other => panic!("expected failed run, got {other:?}"),
    }
}

fn two_date_file() -> Vec<String> {
    vec![
        source_line("1", "2024-01-05", "k", "x"),
        source_line("1", "2024-01-05", "k", "y"),
        source_line("2", "2024-01-06", "k", "z"),
    ]
}

#[tokio::test]
async fn crash_before_ledger_append_reprocesses_file_identically() {
    let clean = EtlHarness::new();
    clean.add_source("a.gz", &two_date_file()).await;
    assert!(matches!(
        clean.engine().run(StrategyKind::Incremental).await,
        RunOutcome::Completed(_)
    ));

    let harness = EtlHarness::new();
    let engine = harness.engine();
    let a = harness.add_source("a.gz", &two_date_file()).await;
    harness.target.inject_write_failure(LEDGER);

    failed(engine.run(StrategyKind::Incremental).await);

    assert_eq!(partition_paths(&harness.target, NS).len(), 2);
    assert!(ledger_entries(&harness.target, LEDGER).is_empty());
    assert_unlocked(&harness.target, LOCK).await;

    harness.target.clear_failures();
    match engine.run(StrategyKind::Incremental).await {
        RunOutcome::Completed(report) => assert_eq!(report.files_processed, 1),
        other => panic!("expected completed retry, got {other:?}"),
    }

    assert_eq!(ledger_entries(&harness.target, LEDGER), vec![a]);
    for date in ["2024-01-05", "2024-01-06"] {
        assert_eq!(
            partition_rows(&harness.target, NS, day(date)),
            partition_rows(&clean.target, NS, day(date)),
            "{date}"
        );
    }
    assert_eq!(
        partition_rows(&harness.target, NS, day("2024-01-05")).unwrap(),
        vec![expected_record("1", "2024-01-05", "k", "y")]
    );
}

#[tokio::test]
async fn partition_read_failure_is_not_treated_as_absent() {
    let harness = EtlHarness::new();
    let engine = harness.engine();
    let a = harness
        .add_source("a.gz", &[source_line("1", "2024-01-05", "k", "a")])
        .await;
    assert!(matches!(
        engine.run(StrategyKind::Incremental).await,
        RunOutcome::Completed(_)
    ));
    let partition = storage_key(NS, day("2024-01-05"));
    let before = harness.target.object(&partition).unwrap();

    harness
        .add_source("b.gz", &[source_line("2", "2024-01-05", "k", "b")])
        .await;
    harness.target.inject_read_failure(partition.clone());

    let err = failed(engine.run(StrategyKind::Incremental).await);

    assert!(matches!(err, EtlError::Storage(_)), "{err}");
    assert_eq!(harness.target.object(&partition).unwrap(), before);
    assert_eq!(ledger_entries(&harness.target, LEDGER), vec![a]);
    assert_unlocked(&harness.target, LOCK).await;
}

#[tokio::test]
async fn decode_failure_keeps_earlier_files_ledgered() {
    let harness = EtlHarness::new();
    let a = harness
        .add_source("a.gz", &[source_line("1", "2024-01-05", "k", "a")])
        .await;
    harness
        .add_raw_source("b.gz", Bytes::from_static(b"\x1f\x8bgarbage"))
        .await;

    let err = failed(harness.engine().run(StrategyKind::Incremental).await);

    assert!(matches!(err, EtlError::Decode { .. }), "{err}");
    assert_eq!(ledger_entries(&harness.target, LEDGER), vec![a]);
    assert_unlocked(&harness.target, LOCK).await;
}

#[tokio::test]
async fn full_rebuild_write_failure_releases_lock() {
    let harness = EtlHarness::new();
    harness
        .add_source("a.gz", &[source_line("1", "2024-01-05", "k", "a")])
        .await;
    harness.target.inject_write_failure("full_rebuild/year=");

    failed(harness.engine().run(StrategyKind::FullRebuild).await);

    assert!(partition_paths(&harness.target, "full_rebuild").is_empty());
    assert_unlocked(&harness.target, LOCK).await;
}

#[tokio::test]
async fn failing_lock_store_fails_without_writing_partitions() {
    let harness = EtlHarness::new();
    harness
        .add_source("a.gz", &[source_line("1", "2024-01-05", "k", "a")])
        .await;
    harness.target.inject_write_failure(LOCK);
    harness.source.clear_operations();

    failed(harness.engine().run(StrategyKind::Incremental).await);

    assert!(harness.target.paths().is_empty());
    assert!(harness.source.operations().is_empty());
}
