//! # strata-cli
//!
//! Command-line interface for the strata partitioned ETL.
//!
//! ## Commands
//!
//! - `strata run` - Run the full-rebuild and/or incremental strategy
//! - `strata unlock` - Force-delete a stale run lock
//! - `strata reset-ledger` - Forget which files the incremental run processed
//! - `strata status` - Show the lock holder and ledger size
//!
//! ## Configuration
//!
//! Every flag falls back to an environment variable:
//!
//! - `STRATA_SOURCE` / `STRATA_TARGET` - store locations (`s3://bucket`,
//!   `file:///path`, a bare path, or `memory://`)
//! - `STRATA_SOURCE_PREFIX` - only read source objects under this prefix
//! - `STRATA_FULL_REBUILD_NAMESPACE` / `STRATA_INCREMENTAL_NAMESPACE`
//! - `STRATA_LOCK_KEY` - run lock sentinel path (default `_etl/lock`)
//! - `STRATA_UNPARSEABLE_DATES` - `quarantine` or `drop`
//! - `STRATA_LOG_FORMAT` - `pretty` or `json`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use strata_core::LogFormat;
use strata_etl::config::{
    DEFAULT_FULL_REBUILD_NAMESPACE, DEFAULT_INCREMENTAL_NAMESPACE, DEFAULT_LOCK_KEY,
};
use strata_etl::{EtlConfig, StoreConfig, UnparseableDatePolicy};

/// Strata - partitioned merge-dedup ETL.
#[derive(Debug, Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Source store location.
    #[arg(long, env = "STRATA_SOURCE")]
    pub source: String,

    /// Target store location.
    #[arg(long, env = "STRATA_TARGET")]
    pub target: String,

    /// Only read source objects under this prefix.
    #[arg(long, env = "STRATA_SOURCE_PREFIX", default_value = "")]
    pub source_prefix: String,

    /// Namespace written by the full-rebuild strategy.
    #[arg(long, env = "STRATA_FULL_REBUILD_NAMESPACE", default_value = DEFAULT_FULL_REBUILD_NAMESPACE)]
    pub full_rebuild_namespace: String,

    /// Namespace written by the incremental strategy.
    #[arg(long, env = "STRATA_INCREMENTAL_NAMESPACE", default_value = DEFAULT_INCREMENTAL_NAMESPACE)]
    pub incremental_namespace: String,

    /// Run lock sentinel path in the target store.
    #[arg(long, env = "STRATA_LOCK_KEY", default_value = DEFAULT_LOCK_KEY)]
    pub lock_key: String,

    /// Handling of rows whose c7 is not a date: quarantine or drop.
    #[arg(long, env = "STRATA_UNPARSEABLE_DATES", default_value = "quarantine")]
    pub unparseable_dates: String,

    /// Log format: pretty or json.
    #[arg(long, env = "STRATA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Builds the effective configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a store location, the date policy, or the
    /// namespace layout is invalid.
    pub fn config(&self) -> Result<Config> {
        let mut etl = EtlConfig::new(
            StoreConfig::parse(&self.source)?,
            StoreConfig::parse(&self.target)?,
        );
        etl.source_prefix.clone_from(&self.source_prefix);
        etl.full_rebuild_namespace.clone_from(&self.full_rebuild_namespace);
        etl.incremental_namespace.clone_from(&self.incremental_namespace);
        etl.lock_key.clone_from(&self.lock_key);
        etl.unparseable_dates = self.unparseable_dates.parse::<UnparseableDatePolicy>()?;
        etl.validate()?;

        Ok(Config {
            etl,
            format: self.format.clone(),
        })
    }

    /// Returns the requested log format.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown format name.
    pub fn log_format(&self) -> Result<LogFormat> {
        self.log_format.parse().map_err(anyhow::Error::msg)
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run one or both strategies.
    Run(commands::run::RunArgs),
    /// Force-delete the run lock left by a crashed run.
    Unlock(commands::unlock::UnlockArgs),
    /// Delete the incremental ledger so every source file is reprocessed.
    ResetLedger(commands::reset_ledger::ResetLedgerArgs),
    /// Show the run lock holder and ledger size.
    Status(commands::status::StatusArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// CLI configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// ETL configuration.
    pub etl: EtlConfig,
    /// Output format.
    pub format: OutputFormat,
}
