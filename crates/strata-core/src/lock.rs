//! Advisory run lock backed by a sentinel object.
//!
//! At most one ETL run may be active against a target store. The lock is a
//! single object whose existence means "a run is in progress, or crashed
//! mid-run". The object body records who took it, for operators clearing a
//! stale lock.
//!
//! # Guarantees
//!
//! The lock is advisory. Acquisition uses a create-only write, which is
//! atomic on stores that support conditional create and degrades to a
//! check-then-write race on stores that do not. It protects against a single
//! scheduler overlapping its own runs; it is not a consensus protocol.
//!
//! There is no TTL. A process that dies while holding the lock leaves it in
//! place until an operator calls [`RunLock::force_break`].
//!
//! # Example
//!
//! ```rust,ignore
//! let lock = RunLock::new(storage.clone(), LockKey::default());
//!
//! if lock.is_locked().await? {
//!     return Ok(());
//! }
//! lock.acquire("incremental").await?;
//! // ... run ...
//! lock.release().await?;
//! ```

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::storage::{StorageBackend, WritePrecondition, WriteResult};
use crate::storage_keys::LockKey;

/// Lock file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    /// Unique lock holder ID.
    pub holder_id: String,

    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,

    /// The operation (strategy) that took the lock.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl LockInfo {
    /// Creates lock info for `holder_id` acquired now.
    #[must_use]
    pub fn new(holder_id: impl Into<String>, operation: Option<String>) -> Self {
        Self {
            holder_id: holder_id.into(),
            acquired_at: Utc::now(),
            operation,
        }
    }
}

/// Outcome of a lock acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The sentinel was created by this holder.
    Acquired,
    /// A sentinel already existed; nothing was written.
    AlreadyHeld {
        /// Identity of the current holder, when the sentinel body is readable.
        holder: Option<String>,
    },
}

/// A run lock backed by object storage.
#[derive(Clone)]
pub struct RunLock {
    storage: Arc<dyn StorageBackend>,
    key: LockKey,
    holder_id: String,
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock")
            .field("key", &self.key)
            .field("holder_id", &self.holder_id)
            .finish_non_exhaustive()
    }
}

impl RunLock {
    /// Creates a run lock handle. Each handle gets a unique holder ID.
    #[must_use]
    pub fn new(storage: Arc<dyn StorageBackend>, key: LockKey) -> Self {
        Self {
            storage,
            key,
            holder_id: Ulid::new().to_string(),
        }
    }

    /// Returns the holder ID for this lock handle.
    #[must_use]
    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// Returns the sentinel key.
    #[must_use]
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// Checks whether the sentinel exists (regardless of holder).
    ///
    /// # Errors
    ///
    /// Returns an error if the lock state could not be read.
    pub async fn is_locked(&self) -> Result<bool> {
        Ok(self.storage.head(self.key.as_ref()).await?.is_some())
    }

    /// Creates the sentinel if it does not exist.
    ///
    /// Never overwrites an existing sentinel. When one exists the outcome is
    /// [`AcquireOutcome::AlreadyHeld`] and storage is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel could not be written.
    pub async fn acquire(&self, operation: &str) -> Result<AcquireOutcome> {
        let info = LockInfo::new(&self.holder_id, Some(operation.to_string()));
        let body = serde_json::to_vec(&info).map_err(|e| Error::Serialization {
            message: format!("serialize lock: {e}"),
        })?;

        match self
            .storage
            .put(
                self.key.as_ref(),
                Bytes::from(body),
                WritePrecondition::DoesNotExist,
            )
            .await?
        {
            WriteResult::Success { .. } => {
                tracing::debug!(lock = %self.key, holder = %self.holder_id, "run lock acquired");
                Ok(AcquireOutcome::Acquired)
            }
            WriteResult::PreconditionFailed { .. } => {
                let holder = self
                    .read_lock_info()
                    .await
                    .ok()
                    .flatten()
                    .map(|info| info.holder_id);
                Ok(AcquireOutcome::AlreadyHeld { holder })
            }
        }
    }

    /// Deletes the sentinel unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel could not be deleted.
    pub async fn release(&self) -> Result<()> {
        self.storage.delete(self.key.as_ref()).await?;
        tracing::debug!(lock = %self.key, holder = %self.holder_id, "run lock released");
        Ok(())
    }

    /// Forcefully removes a lock held by someone else (operator recovery).
    ///
    /// # Warning
    ///
    /// Only use this when the holder is known to be gone, e.g. after a crash.
    /// Breaking the lock of a live run lets two runs write concurrently.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock could not be broken.
    pub async fn force_break(&self) -> Result<Option<LockInfo>> {
        let previous = self.read_lock_info().await.unwrap_or(None);
        self.storage.delete(self.key.as_ref()).await?;
        tracing::warn!(
            lock = %self.key,
            previous_holder = previous.as_ref().map(|p| p.holder_id.as_str()),
            "run lock force-broken"
        );
        Ok(previous)
    }

    /// Reads the current lock info without acquiring the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the sentinel exists but could not be read or parsed.
    pub async fn read_lock_info(&self) -> Result<Option<LockInfo>> {
        match self.storage.get(self.key.as_ref()).await {
            Ok(data) => {
                let info: LockInfo =
                    serde_json::from_slice(&data).map_err(|e| Error::Serialization {
                        message: format!("parse lock: {e}"),
                    })?;
                Ok(Some(info))
            }
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn lock_on(storage: &Arc<MemoryBackend>) -> RunLock {
        RunLock::new(storage.clone(), LockKey::default())
    }

    #[tokio::test]
    async fn acquire_then_release() {
        let storage = Arc::new(MemoryBackend::new());
        let lock = lock_on(&storage);

        assert!(!lock.is_locked().await.unwrap());
        assert_eq!(
            lock.acquire("full_rebuild").await.unwrap(),
            AcquireOutcome::Acquired
        );
        assert!(lock.is_locked().await.unwrap());

        let info = lock.read_lock_info().await.unwrap().expect("lock info");
        assert_eq!(info.holder_id, lock.holder_id());
        assert_eq!(info.operation.as_deref(), Some("full_rebuild"));

        lock.release().await.unwrap();
        assert!(!lock.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn second_holder_sees_already_held() {
        let storage = Arc::new(MemoryBackend::new());
        let first = lock_on(&storage);
        let second = lock_on(&storage);
        assert_ne!(first.holder_id(), second.holder_id());

        first.acquire("incremental").await.unwrap();
        let outcome = second.acquire("incremental").await.unwrap();
        assert_eq!(
            outcome,
            AcquireOutcome::AlreadyHeld {
                holder: Some(first.holder_id().to_string())
            }
        );

        // The original holder's sentinel is untouched.
        let info = second.read_lock_info().await.unwrap().unwrap();
        assert_eq!(info.holder_id, first.holder_id());
    }

    #[tokio::test]
    async fn foreign_sentinel_counts_as_locked() {
        let storage = Arc::new(MemoryBackend::new());
        storage
            .put("_etl/lock", Bytes::from(""), WritePrecondition::None)
            .await
            .unwrap();

        let lock = lock_on(&storage);
        assert!(lock.is_locked().await.unwrap());
        assert_eq!(
            lock.acquire("incremental").await.unwrap(),
            AcquireOutcome::AlreadyHeld { holder: None }
        );
        assert!(lock.read_lock_info().await.is_err());
    }

    #[tokio::test]
    async fn force_break_returns_previous_holder() {
        let storage = Arc::new(MemoryBackend::new());
        let crashed = lock_on(&storage);
        crashed.acquire("incremental").await.unwrap();

        let operator = lock_on(&storage);
        let previous = operator.force_break().await.unwrap().expect("previous");
        assert_eq!(previous.holder_id, crashed.holder_id());
        assert!(!operator.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let storage = Arc::new(MemoryBackend::new());
        let lock = lock_on(&storage);
        lock.release().await.unwrap();
        lock.release().await.unwrap();
    }
}
