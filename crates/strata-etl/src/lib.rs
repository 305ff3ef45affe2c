//! # strata-etl
//!
//! Ingests gzip-compressed, `|`-delimited record files from a source object
//! store, deduplicates records by the composite key (`c1`, `c7`, `c8`), and
//! materializes them as one Parquet snapshot per calendar date of `c7` in a
//! target object store.
//!
//! Two strategies share the same engine:
//!
//! - **Full rebuild** clears its namespace and recomputes every partition from
//!   the whole source corpus.
//! - **Incremental** processes only source files missing from its ledger and
//!   read-merge-writes each touched partition, so newer records win.
//!
//! Both run under the advisory run lock from `strata-core`; see
//! [`coordinator`] for the lock and ledger contract and [`dedup`] for the
//! precedence rules.
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_etl::{EtlConfig, EtlEngine, StrategyKind};
//!
//! let config = EtlConfig::from_env()?;
//! let engine = EtlEngine::from_config(config)?;
//! let outcome = engine.run(StrategyKind::Incremental).await;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod metrics;
pub mod partition;
pub mod partition_store;
pub mod record;
pub mod strategy;

pub use config::{EtlConfig, StoreConfig, UnparseableDatePolicy};
pub use coordinator::{Ledger, RunCoordinator};
pub use dedup::{dedup, merge_partition};
pub use error::{EtlError, Result};
pub use partition::{PartitionDate, partition, storage_key};
pub use partition_store::{PartitionRead, PartitionStore};
pub use record::{DateField, DedupKey, Record};
pub use strategy::{AbortReason, EtlEngine, RunOutcome, RunReport, StrategyKind};
