//! Typed storage keys for the target store layout.
//!
//! Every target-side path the ETL engine touches is built here, so the output
//! layout is defined in exactly one place.
//!
//! # Layout
//!
//! | Key Type | Path |
//! |----------|------|
//! | `PartitionFileKey` | `{namespace}/year=YYYY/month=MM/day=DD/YYYY-MM-DD.snappy.parquet` |
//! | `QuarantineKey` | `{namespace}/quarantine/unparseable_date.snappy.parquet` |
//! | `LockKey` | `_etl/lock` (configurable) |
//! | `LedgerKey` | `_etl/{namespace}/processed_file_list` |
//!
//! Lock and ledger objects live under `_etl/`, outside every partition
//! namespace, so clearing a namespace never touches coordination state.
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use strata_core::storage_keys::PartitionFileKey;
//!
//! let date = NaiveDate::from_ymd_opt(2021, 3, 7).unwrap();
//! let key = PartitionFileKey::for_date("incremental", date);
//! assert_eq!(
//!     key.as_ref(),
//!     "incremental/year=2021/month=03/day=07/2021-03-07.snappy.parquet"
//! );
//! ```

use chrono::{Datelike, NaiveDate};

/// File extension of every columnar partition file.
pub const COLUMNAR_EXTENSION: &str = "snappy.parquet";

/// Prefix reserved for coordination objects (lock, ledgers).
pub const COORDINATION_PREFIX: &str = "_etl";

/// A typed storage key that encodes path structure.
pub trait StorageKey: AsRef<str> {
    /// Returns the underlying path string.
    fn path(&self) -> &str {
        self.as_ref()
    }
}

macro_rules! string_key {
    ($name:ident) => {
        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl StorageKey for $name {}

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

fn normalize(namespace: &str) -> &str {
    namespace.trim_matches('/')
}

// ============================================================================
// NamespacePrefix - listing/deletion scope of one strategy
// ============================================================================

/// The listing prefix of a strategy namespace, always ending in `/`.
///
/// The trailing separator keeps `full` from matching `full_old/...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacePrefix(String);

impl NamespacePrefix {
    /// Creates the prefix for `namespace`.
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        Self(format!("{}/", normalize(namespace)))
    }
}

string_key!(NamespacePrefix);

// ============================================================================
// PartitionFileKey - one columnar snapshot per calendar date
// ============================================================================

/// Path of the columnar file holding one date partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionFileKey(String);

impl PartitionFileKey {
    /// Creates the key for `date` inside `namespace`.
    ///
    /// Year, month and day directory segments are zero-padded; the file name
    /// is the ISO date.
    #[must_use]
    pub fn for_date(namespace: &str, date: NaiveDate) -> Self {
        Self(format!(
            "{ns}/year={y:04}/month={m:02}/day={d:02}/{y:04}-{m:02}-{d:02}.{COLUMNAR_EXTENSION}",
            ns = normalize(namespace),
            y = date.year(),
            m = date.month(),
            d = date.day(),
        ))
    }
}

string_key!(PartitionFileKey);

// ============================================================================
// QuarantineKey - rows whose partition date failed to parse
// ============================================================================

/// Path of the partition holding rows with an unparseable partition date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuarantineKey(String);

impl QuarantineKey {
    /// Creates the quarantine key for `namespace`.
    #[must_use]
    pub fn unparseable_dates(namespace: &str) -> Self {
        Self(format!(
            "{}/quarantine/unparseable_date.{COLUMNAR_EXTENSION}",
            normalize(namespace)
        ))
    }
}

string_key!(QuarantineKey);

// ============================================================================
// LockKey - the run lock sentinel
// ============================================================================

/// Path of the run lock sentinel. Existence means "locked".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// Creates a lock key at an explicit path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

impl Default for LockKey {
    fn default() -> Self {
        Self(format!("{COORDINATION_PREFIX}/lock"))
    }
}

string_key!(LockKey);

// ============================================================================
// LedgerKey - processed source files for one namespace
// ============================================================================

/// Path of the processed-file ledger belonging to a strategy namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey(String);

impl LedgerKey {
    /// Creates the ledger key for `namespace`.
    #[must_use]
    pub fn processed_files(namespace: &str) -> Self {
        Self(format!(
            "{COORDINATION_PREFIX}/{}/processed_file_list",
            normalize(namespace)
        ))
    }
}

string_key!(LedgerKey);
