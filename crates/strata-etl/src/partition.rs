//! Grouping records by the calendar date of `c7`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use strata_core::storage_keys::{PartitionFileKey, QuarantineKey};

use crate::record::{DateField, Record};

/// Partition identity: the calendar date of `c7`.
///
/// Rows whose `c7` failed to parse share the [`PartitionDate::Unparseable`]
/// group. Whether that group is written is decided by
/// [`UnparseableDatePolicy`](crate::config::UnparseableDatePolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartitionDate {
    /// A dated partition.
    Day(NaiveDate),
    /// Rows with an unparseable `c7`.
    Unparseable,
}

impl From<DateField> for PartitionDate {
    fn from(field: DateField) -> Self {
        match field {
            DateField::Parsed(date) => Self::Day(date),
            DateField::Unparseable => Self::Unparseable,
        }
    }
}

impl fmt::Display for PartitionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::Unparseable => f.write_str("unparseable"),
        }
    }
}

/// Groups rows by the date of `c7`.
///
/// Total and exhaustive: every input row lands in exactly one group, and rows
/// keep their relative input order within a group. Groups iterate in date
/// order with the unparseable group last.
#[must_use]
pub fn partition(rows: Vec<Record>) -> BTreeMap<PartitionDate, Vec<Record>> {
    let mut groups: BTreeMap<PartitionDate, Vec<Record>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.c7.into()).or_default().push(row);
    }
    groups
}

/// Returns the storage path of a partition inside `namespace`.
#[must_use]
pub fn storage_key(namespace: &str, date: PartitionDate) -> String {
    match date {
        PartitionDate::Day(day) => PartitionFileKey::for_date(namespace, day).to_string(),
        PartitionDate::Unparseable => QuarantineKey::unparseable_dates(namespace).to_string(),
    }
}
