//! Run coordination: the advisory run lock and the processed-file ledger.
//!
//! ## Lock
//!
//! A single sentinel object is shared by every strategy, so at most one run
//! of any strategy is active at a time. The check-then-create sequence is
//! advisory: on stores without conditional create two runs can both pass
//! [`RunCoordinator::is_locked`]. Where conditional create is available the
//! loser of that race gets [`EtlError::LockHeld`] from
//! [`RunCoordinator::acquire`] and must abort without releasing.
//!
//! A crashed run leaves its sentinel behind. Nothing clears it automatically;
//! an operator calls [`RunCoordinator::force_unlock`].
//!
//! ## Ledger
//!
//! The ledger is a newline-separated list of source file identifiers, one
//! object per strategy namespace. It only ever grows, except through
//! [`RunCoordinator::reset_ledger`]. A file is appended after all of its
//! partitions have been written, so a crash in between leaves it unlisted and
//! the next run reprocesses it; idempotent merge makes that harmless.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use strata_core::storage::{StorageBackend, WritePrecondition};
use strata_core::storage_keys::{LedgerKey, LockKey};
use strata_core::{AcquireOutcome, LockInfo, RunLock};

use crate::error::{EtlError, Result};

/// The set of source files already folded into a namespace.
///
/// Keeps insertion order for serialization and a set for membership checks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: Vec<String>,
    seen: HashSet<String>,
}

impl Ledger {
    /// Parses ledger text. Empty lines are ignored and duplicates collapse.
    ///
    /// Entries are kept byte-for-byte apart from the line terminator, so keys
    /// with surrounding whitespace still match on the next run.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let mut ledger = Self::default();
        for line in text.lines().filter(|l| !l.is_empty()) {
            ledger.push(line);
        }
        ledger
    }

    /// Serializes the ledger, one identifier per line.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(entry);
            text.push('\n');
        }
        text
    }

    /// Returns true if `file` is recorded.
    #[must_use]
    pub fn contains(&self, file: &str) -> bool {
        self.seen.contains(file)
    }

    /// Records `file`. Returns false if it was already present.
    pub fn push(&mut self, file: &str) -> bool {
        if !self.seen.insert(file.to_string()) {
            return false;
        }
        self.entries.push(file.to_string());
        true
    }

    /// Number of recorded files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

/// Lock and ledger operations for one strategy namespace.
pub struct RunCoordinator {
    storage: Arc<dyn StorageBackend>,
    lock: RunLock,
    ledger_key: LedgerKey,
}

impl std::fmt::Debug for RunCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunCoordinator")
            .field("lock", &self.lock)
            .field("ledger_key", &self.ledger_key)
            .finish_non_exhaustive()
    }
}

impl RunCoordinator {
    /// Creates a coordinator for `namespace` using the shared `lock_key`.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, lock_key: LockKey, namespace: &str) -> Self {
        Self {
            lock: RunLock::new(storage.clone(), lock_key),
            ledger_key: LedgerKey::processed_files(namespace),
            storage,
        }
    }

    /// Returns the ledger object path.
    #[must_use]
    pub fn ledger_key(&self) -> &LedgerKey {
        &self.ledger_key
    }

    /// Returns this coordinator's lock holder ID.
    #[must_use]
    pub fn holder_id(&self) -> &str {
        self.lock.holder_id()
    }

    /// Returns true if any run holds the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel could not be checked.
    pub async fn is_locked(&self) -> Result<bool> {
        Ok(self.lock.is_locked().await?)
    }

    /// Takes the lock for `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::LockHeld`] if a sentinel already exists, or a
    /// storage error if it could not be written.
    pub async fn acquire(&self, operation: &str) -> Result<()> {
        match self.lock.acquire(operation).await? {
            AcquireOutcome::Acquired => {
                tracing::info!(holder = %self.lock.holder_id(), operation, "run lock acquired");
                Ok(())
            }
            AcquireOutcome::AlreadyHeld { holder } => Err(EtlError::LockHeld { holder }),
        }
    }

    /// Deletes the sentinel. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel could not be deleted.
    pub async fn release(&self) -> Result<()> {
        self.lock.release().await?;
        tracing::info!(holder = %self.lock.holder_id(), "run lock released");
        Ok(())
    }

    /// Reads the current holder's lock info, if the lock is held.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel exists but could not be read.
    pub async fn lock_info(&self) -> Result<Option<LockInfo>> {
        Ok(self.lock.read_lock_info().await?)
    }

    /// Deletes the sentinel whoever holds it, returning the previous holder.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel could not be deleted.
    pub async fn force_unlock(&self) -> Result<Option<LockInfo>> {
        Ok(self.lock.force_break().await?)
    }

    /// Reads the ledger. A missing ledger object is an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger exists but could not be read.
    pub async fn read_ledger(&self) -> Result<Ledger> {
        match self.storage.get(self.ledger_key.as_ref()).await {
            Ok(bytes) => Ok(Ledger::from_text(&String::from_utf8_lossy(&bytes))),
            Err(e) if e.is_not_found() => Ok(Ledger::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Appends `file` to the ledger and persists it.
    ///
    /// The in-memory ledger is only updated once the write succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger could not be written.
    pub async fn record_processed(&self, ledger: &mut Ledger, file: &str) -> Result<()> {
        if ledger.contains(file) {
            return Ok(());
        }
        let mut next = ledger.clone();
        next.push(file);
        self.storage
            .put(
                self.ledger_key.as_ref(),
                Bytes::from(next.to_text()),
                WritePrecondition::None,
            )
            .await?;
        *ledger = next;
        tracing::debug!(file, entries = ledger.len(), "ledger updated");
        Ok(())
    }

    /// Deletes the ledger, so the next incremental run reprocesses everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger could not be deleted.
    pub async fn reset_ledger(&self) -> Result<()> {
        self.storage.delete(self.ledger_key.as_ref()).await?;
        tracing::warn!(ledger = %self.ledger_key, "ledger reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_core::MemoryBackend;

    use super::*;

    fn coordinator(storage: &Arc<MemoryBackend>) -> RunCoordinator {
        RunCoordinator::new(storage.clone(), LockKey::default(), "incremental")
    }

    #[test]
    fn ledger_text_roundtrip_skips_blanks_and_duplicates() {
        let ledger = Ledger::from_text("a.gz\n\nb.gz\r\na.gz\n");
        assert_eq!(ledger.len(), 2);
        assert!(ledger.contains("b.gz"));
        assert_eq!(ledger.to_text(), "a.gz\nb.gz\n");
        assert_eq!(ledger.iter().collect::<Vec<_>>(), vec!["a.gz", "b.gz"]);
    }

    #[tokio::test]
    async fn whitespace_in_keys_survives_the_ledger() {
        let storage = Arc::new(MemoryBackend::new());
        let coord = coordinator(&storage);
        let mut ledger = coord.read_ledger().await.unwrap();

        coord
            .record_processed(&mut ledger, "landing/ padded .gz")
            .await
            .unwrap();
        coord
            .record_processed(&mut ledger, "landing/tab\t.gz")
            .await
            .unwrap();

        let reread = coord.read_ledger().await.unwrap();
        assert!(reread.contains("landing/ padded .gz"));
        assert!(reread.contains("landing/tab\t.gz"));
        assert!(!reread.contains("landing/padded .gz"));
        assert_eq!(reread, ledger);
    }

    #[tokio::test]
    async fn missing_ledger_is_empty() {
        let storage = Arc::new(MemoryBackend::new());
        let ledger = coordinator(&storage).read_ledger().await.unwrap();
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn record_processed_persists_in_order() {
        let storage = Arc::new(MemoryBackend::new());
        let coord = coordinator(&storage);
        let mut ledger = coord.read_ledger().await.unwrap();

        coord.record_processed(&mut ledger, "s/1.gz").await.unwrap();
        coord.record_processed(&mut ledger, "s/2.gz").await.unwrap();
        coord.record_processed(&mut ledger, "s/1.gz").await.unwrap();

        let stored = storage
            .get("_etl/incremental/processed_file_list")
            .await
            .unwrap();
        assert_eq!(&stored[..], b"s/1.gz\ns/2.gz\n");
        assert_eq!(coord.read_ledger().await.unwrap(), ledger);
    }

    #[tokio::test]
    async fn reset_ledger_forgets_everything() {
        let storage = Arc::new(MemoryBackend::new());
        let coord = coordinator(&storage);
        let mut ledger = Ledger::default();
        coord.record_processed(&mut ledger, "x.gz").await.unwrap();

        coord.reset_ledger().await.unwrap();
        assert!(coord.read_ledger().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_acquire_reports_holder() {
        let storage = Arc::new(MemoryBackend::new());
        let first = coordinator(&storage);
        let second = RunCoordinator::new(storage.clone(), LockKey::default(), "full_rebuild");

        first.acquire("incremental").await.unwrap();
        assert!(second.is_locked().await.unwrap());

        match second.acquire("full_rebuild").await {
            Err(EtlError::LockHeld { holder }) => {
                assert_eq!(holder.as_deref(), Some(first.holder_id()));
            }
            other => panic!("expected LockHeld, got {other:?}"),
        }

        first.release().await.unwrap();
        assert!(!second.is_locked().await.unwrap());
        second.acquire("full_rebuild").await.unwrap();
    }

    #[tokio::test]
    async fn force_unlock_returns_previous_holder() {
        let storage = Arc::new(MemoryBackend::new());
        let crashed = coordinator(&storage);
        crashed.acquire("incremental").await.unwrap();

        let operator = coordinator(&storage);
        let previous = operator.force_unlock().await.unwrap().unwrap();
        assert_eq!(previous.holder_id, crashed.holder_id());
        assert_eq!(previous.operation.as_deref(), Some("incremental"));
        assert!(!operator.is_locked().await.unwrap());
    }
}
