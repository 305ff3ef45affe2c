//! Reading and writing partition snapshots in the target store.
//!
//! A partition is a single Parquet object. Reads distinguish an absent
//! partition (a normal state, first write creates it) from a read that
//! failed, which aborts the run instead of being treated as empty.

use std::sync::Arc;

use strata_core::storage::{StorageBackend, WritePrecondition};
use strata_core::storage_keys::NamespacePrefix;

use crate::codec::{decode_columnar, encode_columnar};
use crate::error::Result;
use crate::partition::{PartitionDate, storage_key};
use crate::record::Record;

/// Result of reading a partition's current snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionRead {
    /// The partition exists; rows in file order.
    Found(Vec<Record>),
    /// No snapshot has been written yet.
    Absent,
}

impl PartitionRead {
    /// Returns the rows, or `None` for an absent partition.
    #[must_use]
    pub fn into_rows(self) -> Option<Vec<Record>> {
        match self {
            Self::Found(rows) => Some(rows),
            Self::Absent => None,
        }
    }
}

/// Partition snapshots of one strategy namespace.
#[derive(Clone)]
pub struct PartitionStore {
    storage: Arc<dyn StorageBackend>,
    namespace: String,
}

impl std::fmt::Debug for PartitionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl PartitionStore {
    /// Creates a store for `namespace` on the target backend.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, namespace: impl Into<String>) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
        }
    }

    /// Returns the namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the object path for a partition.
    #[must_use]
    pub fn key(&self, date: PartitionDate) -> String {
        storage_key(&self.namespace, date)
    }

    /// Reads a partition's current snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the object exists but could not be read or decoded.
    pub async fn read(&self, date: PartitionDate) -> Result<PartitionRead> {
        let key = self.key(date);
        match self.storage.get(&key).await {
            Ok(bytes) => {
                let rows = decode_columnar(&bytes).map_err(|e| e.in_object(&key))?;
                Ok(PartitionRead::Found(rows))
            }
            Err(e) if e.is_not_found() => Ok(PartitionRead::Absent),
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces a partition's snapshot with `rows`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the write failed.
    pub async fn write(&self, date: PartitionDate, rows: &[Record]) -> Result<String> {
        let key = self.key(date);
        let bytes = encode_columnar(rows)?;
        self.storage
            .put(&key, bytes, WritePrecondition::None)
            .await?;
        tracing::debug!(partition = %date, key = %key, rows = rows.len(), "partition written");
        Ok(key)
    }

    /// Deletes every object in the namespace, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or any deletion failed.
    pub async fn clear(&self) -> Result<usize> {
        let prefix = NamespacePrefix::new(&self.namespace);
        let removed = self.storage.delete_all(prefix.as_ref()).await?;
        tracing::info!(namespace = %self.namespace, removed, "namespace cleared");
        Ok(removed)
    }
}
