//! Pre-built test fixtures for common ETL scenarios.
//!
//! Source lines are built with [`source_line`] and gzip-packed with
//! [`gz_delimited`]; [`expected_record`] returns what the codec decodes such a
//! line to, so tests can compare partition contents directly.

use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use strata_core::storage::{StorageBackend, WritePrecondition};
use strata_etl::{EtlConfig, EtlEngine, Record, StoreConfig};

use crate::storage::TracingMemoryBackend;

/// Prefix under which [`EtlHarness::add_source`] stores source files.
pub const SOURCE_PREFIX: &str = "landing/";

/// Builds one `|`-delimited source line.
///
/// `c1`, `c7`, and `c8` form the dedup key; `payload` goes into `c2` so tests
/// can tell which duplicate survived. The remaining columns are empty.
pub fn source_line(c1: &str, c7: &str, c8: &str, payload: &str) -> String {
    [c1, payload, "", "", "", "", c7, c8].join("|")
}

/// The record [`source_line`] with the same arguments decodes to.
pub fn expected_record(c1: &str, c7: &str, c8: &str, payload: &str) -> Record {
    fn field(v: &str) -> Option<&str> {
        (!v.is_empty()).then_some(v)
    }

    Record::from_raw([
        field(c1),
        field(payload),
        None,
        None,
        None,
        None,
        field(c7),
        field(c8),
    ])
}

/// Gzip-compresses newline-terminated lines.
pub fn gz_delimited<S: AsRef<str>>(lines: &[S]) -> Bytes {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for line in lines {
        encoder.write_all(line.as_ref().as_bytes()).expect("gzip write");
        encoder.write_all(b"\n").expect("gzip write");
    }
    Bytes::from(encoder.finish().expect("gzip finish"))
}

/// Source and target stores plus a configuration pointing at them.
pub struct EtlHarness {
    /// Store holding the gzip delimited source files.
    pub source: Arc<TracingMemoryBackend>,
    /// Store receiving partitions, the ledger, and the lock.
    pub target: Arc<TracingMemoryBackend>,
    /// Engine configuration; edit before calling [`EtlHarness::engine`].
    pub config: EtlConfig,
}

impl EtlHarness {
    /// Creates empty stores and a default configuration reading `landing/`.
    pub fn new() -> Self {
        let mut config = EtlConfig::new(StoreConfig::Memory, StoreConfig::Memory);
        config.source_prefix = SOURCE_PREFIX.to_string();
        Self {
            source: Arc::new(TracingMemoryBackend::new()),
            target: Arc::new(TracingMemoryBackend::new()),
            config,
        }
    }

    /// Builds an engine over the harness stores.
    pub fn engine(&self) -> EtlEngine {
        EtlEngine::new(self.config.clone(), self.source.clone(), self.target.clone())
            .expect("valid harness config")
    }

    /// Stores a gzip source file named `name` under [`SOURCE_PREFIX`].
    pub async fn add_source<S: AsRef<str>>(&self, name: &str, lines: &[S]) -> String {
        let path = format!("{SOURCE_PREFIX}{name}");
        self.source
            .put(&path, gz_delimited(lines), WritePrecondition::None)
            .await
            .expect("store source file");
        path
    }

    /// Stores a raw (not necessarily valid) source object.
    pub async fn add_raw_source(&self, name: &str, bytes: Bytes) -> String {
        let path = format!("{SOURCE_PREFIX}{name}");
        self.source
            .put(&path, bytes, WritePrecondition::None)
            .await
            .expect("store source file");
        path
    }
}

impl Default for EtlHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use strata_etl::codec::decode_delimited;

    use super::*;

    #[test]
    fn expected_record_matches_decoded_line() {
        let bytes = gz_delimited(&[source_line("7", "2024-02-29", "k", "body")]);
        let decoded = decode_delimited(&bytes).unwrap();
        assert_eq!(decoded, vec![expected_record("7", "2024-02-29", "k", "body")]);
    }

    #[test]
    fn expected_record_maps_empty_fields_to_null() {
        let record = expected_record("7", "2024-02-29", "", "");
        assert_eq!(record.c1.as_deref(), Some("7"));
        assert_eq!(record.c2, None);
        assert_eq!(record.c8, None);

        let bytes = gz_delimited(&[source_line("7", "2024-02-29", "", "")]);
        assert_eq!(decode_delimited(&bytes).unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn add_source_places_files_under_prefix() {
        let harness = EtlHarness::new();
        let path = harness.add_source("a.gz", &["x"]).await;
        assert_eq!(path, "landing/a.gz");
        assert_eq!(harness.source.paths(), vec!["landing/a.gz"]);
    }
}
