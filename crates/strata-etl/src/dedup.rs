//! The merge-dedup engine.
//!
//! Precedence is by position: among records sharing a [`DedupKey`], the one
//! that appears *last* in the input sequence wins. Inputs are therefore
//! ordered sequences, not sets, and callers choose precedence by choosing
//! order. [`merge_partition`] puts incoming rows after existing ones so new
//! data overrides old.
//!
//! [`DedupKey`]: crate::record::DedupKey

use std::collections::HashMap;

use crate::record::Record;

/// Collapses rows sharing a dedup key, keeping the last occurrence of each.
///
/// Survivors keep their relative input order, so the output lists each key's
/// winning record at the position where it appeared. Idempotent.
#[must_use]
pub fn dedup(rows: Vec<Record>) -> Vec<Record> {
    let mut keep = vec![false; rows.len()];
    {
        let mut last_seen = HashMap::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            last_seen.insert(row.dedup_key(), idx);
        }
        for idx in last_seen.into_values() {
            keep[idx] = true;
        }
    }

    rows.into_iter()
        .zip(keep)
        .filter_map(|(row, keep)| keep.then_some(row))
        .collect()
}

/// Merges incoming rows into a partition's existing state.
///
/// With no existing state the result is `dedup(incoming)`. Otherwise it is
/// `dedup(existing ++ incoming)`: incoming rows come last, so they win ties.
#[must_use]
pub fn merge_partition(existing: Option<Vec<Record>>, incoming: Vec<Record>) -> Vec<Record> {
    match existing {
        None => dedup(incoming),
        Some(mut rows) => {
            rows.extend(incoming);
            dedup(rows)
        }
    }
}
