//! # strata-core
//!
//! Shared primitives for the strata partitioned-ETL crates.
//!
//! - **Storage**: the [`StorageBackend`] contract plus in-memory and
//!   `object_store`-backed implementations
//! - **Storage Keys**: typed paths for partitions, the run lock, and ledgers
//! - **Run Lock**: the advisory mutual-exclusion sentinel
//! - **Error Types**: shared error definitions and result types
//! - **Observability**: logging initialisation and span helpers
//!
//! ## Example
//!
//! ```rust
//! use strata_core::prelude::*;
//!
//! let key = LockKey::default();
//! assert_eq!(key.as_ref(), "_etl/lock");
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod lock;
pub mod object_store_backend;
pub mod observability;
pub mod storage;
pub mod storage_keys;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use strata_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::lock::{AcquireOutcome, LockInfo, RunLock};
    pub use crate::object_store_backend::ObjectStoreBackend;
    pub use crate::storage::{
        MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult,
    };
    pub use crate::storage_keys::{
        LedgerKey, LockKey, NamespacePrefix, PartitionFileKey, QuarantineKey, StorageKey,
    };
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use lock::{AcquireOutcome, LockInfo, RunLock};
pub use object_store_backend::ObjectStoreBackend;
pub use observability::{LogFormat, init_logging};
pub use storage::{MemoryBackend, ObjectMeta, StorageBackend, WritePrecondition, WriteResult};
