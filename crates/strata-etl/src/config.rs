//! ETL configuration.
//!
//! Configuration is an explicit value handed to [`EtlEngine`](crate::EtlEngine);
//! nothing reads the environment after startup. [`EtlConfig::from_env`] is a
//! convenience for binaries.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::storage_keys::COORDINATION_PREFIX;
use strata_core::{MemoryBackend, ObjectStoreBackend, StorageBackend};

use crate::error::{EtlError, Result};

/// Default namespace of the full-rebuild strategy.
pub const DEFAULT_FULL_REBUILD_NAMESPACE: &str = "full_rebuild";
/// Default namespace of the incremental strategy.
pub const DEFAULT_INCREMENTAL_NAMESPACE: &str = "incremental";
/// Default run-lock sentinel path.
pub const DEFAULT_LOCK_KEY: &str = "_etl/lock";

/// Where a store lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// An S3 bucket. Credentials come from the standard AWS environment.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Region override; the AWS environment decides when `None`.
        region: Option<String>,
    },
    /// A directory on the local filesystem.
    Local {
        /// Root directory; object paths are relative to it.
        root: PathBuf,
    },
    /// A fresh, empty in-memory store.
    Memory,
}

impl StoreConfig {
    /// Parses a location: `s3://bucket[?region=...]`, `file:///path`, a bare
    /// path, or `memory://`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for empty locations or unknown schemes.
    pub fn parse(location: &str) -> Result<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Err(EtlError::config("store location must not be empty"));
        }

        if location == "memory://" || location == "memory" {
            return Ok(Self::Memory);
        }
        if let Some(rest) = location.strip_prefix("s3://") {
            let (bucket, query) = rest.split_once('?').unwrap_or((rest, ""));
            let bucket = bucket.trim_end_matches('/');
            if bucket.is_empty() || bucket.contains('/') {
                return Err(EtlError::config(format!(
                    "s3 location must be s3://<bucket> (got {location})"
                )));
            }
            let region = query
                .split('&')
                .find_map(|pair| pair.strip_prefix("region="))
                .filter(|r| !r.is_empty())
                .map(str::to_string);
            return Ok(Self::S3 {
                bucket: bucket.to_string(),
                region,
            });
        }
        if let Some(path) = location.strip_prefix("file://") {
            if path.is_empty() {
                return Err(EtlError::config("file:// location needs a path"));
            }
            return Ok(Self::Local { root: path.into() });
        }
        if location.contains("://") {
            return Err(EtlError::config(format!(
                "unsupported store scheme in {location} (expected s3://, file://, or memory://)"
            )));
        }
        Ok(Self::Local {
            root: location.into(),
        })
    }

    /// Opens the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be constructed.
    pub fn open(&self) -> Result<Arc<dyn StorageBackend>> {
        let backend: Arc<dyn StorageBackend> = match self {
            Self::S3 { bucket, region } => {
                Arc::new(ObjectStoreBackend::s3(bucket, region.as_deref())?)
            }
            Self::Local { root } => Arc::new(ObjectStoreBackend::local(root)?),
            Self::Memory => Arc::new(MemoryBackend::new()),
        };
        Ok(backend)
    }
}

impl std::fmt::Display for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::S3 { bucket, .. } => write!(f, "s3://{bucket}"),
            Self::Local { root } => write!(f, "file://{}", root.display()),
            Self::Memory => f.write_str("memory://"),
        }
    }
}

/// What happens to rows whose `c7` is not a date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnparseableDatePolicy {
    /// Keep them in a quarantine partition inside the namespace.
    #[default]
    Quarantine,
    /// Discard them with a warning.
    Drop,
}

impl FromStr for UnparseableDatePolicy {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quarantine" => Ok(Self::Quarantine),
            "drop" => Ok(Self::Drop),
            other => Err(EtlError::config(format!(
                "unparseable date policy must be quarantine or drop (got {other})"
            ))),
        }
    }
}

/// Configuration for an ETL engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtlConfig {
    /// Store holding the gzip delimited source files.
    pub source: StoreConfig,
    /// Store receiving partitions, the ledger, and the lock.
    pub target: StoreConfig,
    /// Only source objects under this prefix are read. Empty means all.
    pub source_prefix: String,
    /// Namespace written by the full-rebuild strategy.
    pub full_rebuild_namespace: String,
    /// Namespace written by the incremental strategy.
    pub incremental_namespace: String,
    /// Run-lock sentinel path in the target store.
    pub lock_key: String,
    /// Handling of rows with an unparseable `c7`.
    pub unparseable_dates: UnparseableDatePolicy,
}

impl EtlConfig {
    /// Creates a configuration with default namespaces and lock key.
    #[must_use]
    pub fn new(source: StoreConfig, target: StoreConfig) -> Self {
        Self {
            source,
            target,
            source_prefix: String::new(),
            full_rebuild_namespace: DEFAULT_FULL_REBUILD_NAMESPACE.to_string(),
            incremental_namespace: DEFAULT_INCREMENTAL_NAMESPACE.to_string(),
            lock_key: DEFAULT_LOCK_KEY.to_string(),
            unparseable_dates: UnparseableDatePolicy::default(),
        }
    }

    /// Loads configuration from `STRATA_*` environment variables.
    ///
    /// `STRATA_SOURCE` and `STRATA_TARGET` are required.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a variable is missing or invalid, or
    /// if the result fails [`EtlConfig::validate`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &str| {
            var(name).ok_or_else(|| EtlError::config(format!("{name} is required")))
        };

        let mut config = Self::new(
            StoreConfig::parse(&required("STRATA_SOURCE")?)?,
            StoreConfig::parse(&required("STRATA_TARGET")?)?,
        );
        if let Some(prefix) = var("STRATA_SOURCE_PREFIX") {
            config.source_prefix = prefix;
        }
        if let Some(ns) = var("STRATA_FULL_REBUILD_NAMESPACE") {
            config.full_rebuild_namespace = ns;
        }
        if let Some(ns) = var("STRATA_INCREMENTAL_NAMESPACE") {
            config.incremental_namespace = ns;
        }
        if let Some(key) = var("STRATA_LOCK_KEY") {
            config.lock_key = key;
        }
        if let Some(policy) = var("STRATA_UNPARSEABLE_DATES") {
            config.unparseable_dates = policy.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks that namespaces and the lock key cannot collide, and that a
    /// source sharing the target store cannot list the ETL's own outputs.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let full = normalized("full rebuild namespace", &self.full_rebuild_namespace)?;
        let incremental = normalized("incremental namespace", &self.incremental_namespace)?;
        let lock = normalized("lock key", &self.lock_key)?;

        if contains_segments(&full, &incremental) || contains_segments(&incremental, &full) {
            return Err(EtlError::config(format!(
                "namespaces overlap: {full} and {incremental}"
            )));
        }
        for ns in [&full, &incremental] {
            if contains_segments(COORDINATION_PREFIX, ns)
                || contains_segments(ns, COORDINATION_PREFIX)
            {
                return Err(EtlError::config(format!(
                    "namespace {ns} overlaps the reserved {COORDINATION_PREFIX}/ prefix"
                )));
            }
            if contains_segments(ns, &lock) {
                return Err(EtlError::config(format!(
                    "lock key {lock} lies inside namespace {ns}"
                )));
            }
        }

        // Each memory store is a separate instance, so only real stores can be shared.
        if self.source == self.target && self.source != StoreConfig::Memory {
            let prefix = self.source_prefix.as_str();
            let reserved = [
                full.as_str(),
                incremental.as_str(),
                COORDINATION_PREFIX,
                lock.as_str(),
            ];
            if let Some(root) = reserved
                .into_iter()
                .find(|root| listing_reaches(prefix, root))
            {
                return Err(EtlError::config(format!(
                    "source prefix {prefix:?} on shared store {} would read ETL output under {root}",
                    self.source
                )));
            }
        }
        Ok(())
    }
}

/// True if listing string prefix `prefix` can return keys at or under `root`.
fn listing_reaches(prefix: &str, root: &str) -> bool {
    root.starts_with(prefix) || contains_segments(root, prefix.trim_end_matches('/'))
}

fn normalized(what: &str, value: &str) -> Result<String> {
    let trimmed = value.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(EtlError::config(format!("{what} must not be empty")));
    }
    if trimmed.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        return Err(EtlError::config(format!(
            "{what} has an empty or relative path segment: {value}"
        )));
    }
    Ok(trimmed.to_string())
}

/// True if `path` equals `prefix` or lies beneath it, comparing whole segments.
fn contains_segments(prefix: &str, path: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn memory_config() -> EtlConfig {
        EtlConfig::new(StoreConfig::Memory, StoreConfig::Memory)
    }

    #[test]
    fn parses_store_locations() {
        assert_eq!(
            StoreConfig::parse("s3://landing").unwrap(),
            StoreConfig::S3 {
                bucket: "landing".into(),
                region: None
            }
        );
        assert_eq!(
            StoreConfig::parse("s3://landing/?region=eu-west-1").unwrap(),
            StoreConfig::S3 {
                bucket: "landing".into(),
                region: Some("eu-west-1".into())
            }
        );
        assert_eq!(
            StoreConfig::parse("file:///data/out").unwrap(),
            StoreConfig::Local {
                root: "/data/out".into()
            }
        );
        assert_eq!(
            StoreConfig::parse("./out").unwrap(),
            StoreConfig::Local {
                root: "./out".into()
            }
        );
        assert_eq!(StoreConfig::parse("memory://").unwrap(), StoreConfig::Memory);
    }

    #[test]
    fn rejects_bad_store_locations() {
        for bad in ["", "  ", "gs://bucket", "s3://", "s3://bucket/key", "file://"] {
            assert!(StoreConfig::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for location in ["s3://landing", "file:///tmp/x", "memory://"] {
            let parsed = StoreConfig::parse(location).unwrap();
            assert_eq!(StoreConfig::parse(&parsed.to_string()).unwrap(), parsed);
        }
    }

    #[test]
    fn policy_parses_case_insensitively() {
        assert_eq!(
            "DROP".parse::<UnparseableDatePolicy>().unwrap(),
            UnparseableDatePolicy::Drop
        );
        assert_eq!(
            "quarantine".parse::<UnparseableDatePolicy>().unwrap(),
            UnparseableDatePolicy::Quarantine
        );
        assert!("keep".parse::<UnparseableDatePolicy>().is_err());
    }

    #[test]
    fn from_lookup_applies_defaults() {
        let config = EtlConfig::from_lookup(lookup(&[
            ("STRATA_SOURCE", "memory://"),
            ("STRATA_TARGET", "s3://warehouse"),
        ]))
        .unwrap();

        assert_eq!(config.full_rebuild_namespace, "full_rebuild");
        assert_eq!(config.incremental_namespace, "incremental");
        assert_eq!(config.lock_key, "_etl/lock");
        assert_eq!(config.source_prefix, "");
        assert_eq!(config.unparseable_dates, UnparseableDatePolicy::Quarantine);
    }

    #[test]
    fn from_lookup_reads_overrides() {
        let config = EtlConfig::from_lookup(lookup(&[
            ("STRATA_SOURCE", "memory://"),
            ("STRATA_TARGET", "memory://"),
            ("STRATA_SOURCE_PREFIX", "landing/"),
            ("STRATA_FULL_REBUILD_NAMESPACE", "snap"),
            ("STRATA_INCREMENTAL_NAMESPACE", "delta"),
            ("STRATA_LOCK_KEY", "locks/etl"),
            ("STRATA_UNPARSEABLE_DATES", "drop"),
        ]))
        .unwrap();

        assert_eq!(config.source_prefix, "landing/");
        assert_eq!(config.full_rebuild_namespace, "snap");
        assert_eq!(config.incremental_namespace, "delta");
        assert_eq!(config.lock_key, "locks/etl");
        assert_eq!(config.unparseable_dates, UnparseableDatePolicy::Drop);
    }

    #[test]
    fn from_lookup_requires_stores() {
        let err = EtlConfig::from_lookup(lookup(&[("STRATA_SOURCE", "memory://")])).unwrap_err();
        assert!(err.to_string().contains("STRATA_TARGET"));
    }

    #[test]
    fn default_config_is_valid() {
        memory_config().validate().unwrap();
    }

    #[test]
    fn validate_rejects_collisions() {
        let cases: [(&str, &str, &str); 6] = [
            ("same", "same", "_etl/lock"),
            ("out", "out/inc", "_etl/lock"),
            ("", "incremental", "_etl/lock"),
            ("a/../b", "incremental", "_etl/lock"),
            ("_etl", "incremental", "_etl/lock"),
            ("full_rebuild", "incremental", "incremental/lock"),
        ];
        for (full, inc, lock) in cases {
            let mut config = memory_config();
            config.full_rebuild_namespace = full.into();
            config.incremental_namespace = inc.into();
            config.lock_key = lock.into();
            assert!(config.validate().is_err(), "accepted {full}, {inc}, {lock}");
        }
    }

    #[test]
    fn shared_store_needs_a_disjoint_source_prefix() {
        let shared = StoreConfig::parse("s3://warehouse").unwrap();
        for prefix in ["", "full", "incremental/", "_etl/", "full_rebuild/2021"] {
            let mut config = EtlConfig::new(shared.clone(), shared.clone());
            config.source_prefix = prefix.into();
            let err = config.validate().expect_err(prefix);
            assert!(err.to_string().contains("shared store"), "{err}");
        }

        let mut config = EtlConfig::new(shared.clone(), shared);
        config.source_prefix = "landing/".into();
        config.validate().unwrap();
    }

    #[test]
    fn separate_stores_allow_any_source_prefix() {
        let mut config = EtlConfig::new(
            StoreConfig::parse("s3://landing").unwrap(),
            StoreConfig::parse("s3://warehouse").unwrap(),
        );
        config.validate().unwrap();
        config.source_prefix = "full_rebuild/".into();
        config.validate().unwrap();
        memory_config().validate().unwrap();
    }

    #[test]
    fn validate_compares_whole_segments() {
        let mut config = memory_config();
        config.full_rebuild_namespace = "full".into();
        config.incremental_namespace = "full_inc".into();
        config.validate().unwrap();
    }
}
