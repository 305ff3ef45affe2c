//! Custom assertion helpers for integration tests.

use chrono::NaiveDate;
use strata_core::storage::StorageBackend;
use strata_etl::codec::decode_columnar;
use strata_etl::{PartitionDate, Record, storage_key};

use crate::storage::{StorageOp, TracingMemoryBackend};

/// Parses a `YYYY-MM-DD` literal into a partition date.
pub fn day(date: &str) -> PartitionDate {
    PartitionDate::Day(NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("valid date literal"))
}

/// Reads and decodes a partition snapshot, or `None` if it does not exist.
pub fn partition_rows(
    storage: &TracingMemoryBackend,
    namespace: &str,
    date: PartitionDate,
) -> Option<Vec<Record>> {
    storage
        .object(&storage_key(namespace, date))
        .map(|bytes| decode_columnar(&bytes).expect("decodable partition"))
}

/// Returns the partition paths stored under `namespace`, sorted.
pub fn partition_paths(storage: &TracingMemoryBackend, namespace: &str) -> Vec<String> {
    let prefix = format!("{namespace}/");
    storage
        .paths()
        .into_iter()
        .filter(|p| p.starts_with(&prefix))
        .collect()
}

/// Asserts that a partition holds exactly `expected`, in order.
///
/// # Panics
///
/// Panics if the partition is missing or its rows differ.
pub fn assert_partition(
    storage: &TracingMemoryBackend,
    namespace: &str,
    date: PartitionDate,
    expected: &[Record],
) {
    let rows = partition_rows(storage, namespace, date)
        .unwrap_or_else(|| panic!("partition {date} missing in {namespace}"));
    assert_eq!(rows, expected, "partition {date} in {namespace}");
}

/// Asserts that none of the operations mutated the store.
///
/// # Panics
///
/// Panics if any put or delete was recorded.
pub fn assert_no_writes(ops: &[StorageOp]) {
    let writes: Vec<_> = ops.iter().filter(|op| op.is_write()).collect();
    assert!(writes.is_empty(), "expected no writes, got {writes:?}");
}

/// Asserts that the run lock sentinel is absent.
///
/// # Panics
///
/// Panics if the sentinel exists or cannot be checked.
pub async fn assert_unlocked(storage: &TracingMemoryBackend, lock_key: &str) {
    let head = storage.head(lock_key).await.expect("head lock");
    assert!(head.is_none(), "run lock {lock_key} is still held");
}

/// Returns the ledger entries stored at `ledger_key`, in order.
pub fn ledger_entries(storage: &TracingMemoryBackend, ledger_key: &str) -> Vec<String> {
    storage
        .object(ledger_key)
        .map(|bytes| {
            String::from_utf8_lossy(&bytes)
                .lines()
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
