//! Shared test utilities for strata integration tests.
//!
//! This crate provides:
//! - [`TracingMemoryBackend`]: In-memory storage with operation recording and
//!   separate read/write failure injection
//! - [`EtlHarness`]: Source and target stores wired into an engine
//! - Builders for gzip delimited source files and the records they decode to
//! - Custom assertion helpers
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_test_utils::{EtlHarness, source_line};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = EtlHarness::new();
//!     harness.add_source("a.gz", &[source_line("1", "2024-01-01", "x", "p")]).await;
//!     let outcome = harness.engine().run(StrategyKind::Incremental).await;
//! }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod fixtures;
pub mod storage;

pub use assertions::*;
pub use fixtures::*;
pub use storage::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("strata_etl=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
