//! Full-rebuild strategy scenarios.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bytes::Bytes;
use strata_core::{StorageBackend, WritePrecondition};
use strata_etl::{RunOutcome, StrategyKind, UnparseableDatePolicy};
use strata_test_utils::{
    EtlHarness, assert_partition, assert_unlocked, day, expected_record, init_test_logging,
    partition_paths, source_line,
};

const NS: &str = "full_rebuild";

fn completed(outcome: RunOutcome) -> strata_etl::RunReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        other => panic!("expected completed run, got {other:?}"),
    }
}

#[tokio::test]
async fn overlapping_files_collapse_to_one_partition() {
    init_test_logging();
    let harness = EtlHarness::new();
    harness
        .add_source(
            "a.gz",
            &[
                source_line("1", "2024-01-05", "k", "a-old"),
                source_line("2", "2024-01-05", "k", "a"),
            ],
        )
        .await;
    harness
        .add_source(
            "b.gz",
            &[
                source_line("1", "2024-01-05", "k", "b-new"),
                source_line("3", "2024-01-06", "k", "b"),
            ],
        )
        .await;

    let report = completed(harness.engine().run(StrategyKind::FullRebuild).await);

    assert_eq!(report.files_processed, 2);
    assert_eq!(report.rows_read, 4);
    assert_eq!(report.partitions_written, 2);
    assert_eq!(report.rows_written, 3);
    assert_partition(
        &harness.target,
        NS,
        day("2024-01-05"),
        &[
            expected_record("2", "2024-01-05", "k", "a"),
            expected_record("1", "2024-01-05", "k", "b-new"),
        ],
    );
    assert_partition(
        &harness.target,
        NS,
        day("2024-01-06"),
        &[expected_record("3", "2024-01-06", "k", "b")],
    );
    assert_unlocked(&harness.target, "_etl/lock").await;
}

#[tokio::test]
async fn orphaned_partitions_from_earlier_runs_are_removed() {
    let harness = EtlHarness::new();
    let orphan = "full_rebuild/year=2023/month=12/day=31/2023-12-31.snappy.parquet";
    let neighbour = "incremental/year=2023/month=12/day=31/2023-12-31.snappy.parquet";
    for path in [orphan, neighbour] {
        harness
            .target
            .put(path, Bytes::from_static(b"stale"), WritePrecondition::None)
            .await
            .unwrap();
    }
    harness
        .add_source("a.gz", &[source_line("1", "2024-01-05", "k", "p")])
        .await;

    completed(harness.engine().run(StrategyKind::FullRebuild).await);

    assert_eq!(
        partition_paths(&harness.target, NS),
        vec!["full_rebuild/year=2024/month=01/day=05/2024-01-05.snappy.parquet"]
    );
    assert!(harness.target.object(neighbour).is_some());
}

#[tokio::test]
async fn rebuild_is_repeatable() {
    let harness = EtlHarness::new();
    harness
        .add_source(
            "a.gz",
            &[
                source_line("1", "2024-03-01", "k", "x"),
                source_line("1", "2024-03-01", "k", "y"),
            ],
        )
        .await;
    let engine = harness.engine();

    completed(engine.run(StrategyKind::FullRebuild).await);
    let first = partition_paths(&harness.target, NS);
    completed(engine.run(StrategyKind::FullRebuild).await);

    assert_eq!(partition_paths(&harness.target, NS), first);
    assert_partition(
        &harness.target,
        NS,
        day("2024-03-01"),
        &[expected_record("1", "2024-03-01", "k", "y")],
    );
}

#[tokio::test]
async fn unparseable_dates_are_quarantined_by_default() {
    let harness = EtlHarness::new();
    harness
        .add_source(
            "a.gz",
            &[
                source_line("1", "not-a-date", "k", "x"),
                source_line("2", "2024-01-05", "k", "y"),
            ],
        )
        .await;

    let report = completed(harness.engine().run(StrategyKind::FullRebuild).await);

    assert_eq!(report.rows_quarantined, 1);
    assert_eq!(report.partitions_written, 2);
    assert_partition(
        &harness.target,
        NS,
        strata_etl::PartitionDate::Unparseable,
        &[expected_record("1", "not-a-date", "k", "x")],
    );
    assert!(
        harness
            .target
            .object("full_rebuild/quarantine/unparseable_date.snappy.parquet")
            .is_some()
    );
}

#[tokio::test]
async fn unparseable_dates_can_be_dropped() {
    let mut harness = EtlHarness::new();
    harness.config.unparseable_dates = UnparseableDatePolicy::Drop;
    harness
        .add_source(
            "a.gz",
            &[
                source_line("1", "", "k", "x"),
                source_line("2", "2024-01-05", "k", "y"),
            ],
        )
        .await;

    let report = completed(harness.engine().run(StrategyKind::FullRebuild).await);

    assert_eq!(report.rows_dropped, 1);
    assert_eq!(report.rows_quarantined, 0);
    assert_eq!(
        partition_paths(&harness.target, NS),
        vec!["full_rebuild/year=2024/month=01/day=05/2024-01-05.snappy.parquet"]
    );
}

#[tokio::test]
async fn undecodable_source_fails_and_releases_lock() {
    let harness = EtlHarness::new();
    harness
        .add_raw_source("bad.gz", Bytes::from_static(b"plain text, not gzip"))
        .await;

    match harness.engine().run(StrategyKind::FullRebuild).await {
        RunOutcome::Failed(err) => assert!(err.to_string().contains("landing/bad.gz")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_unlocked(&harness.target, "_etl/lock").await;
}
