//! Strategy drivers.
//!
//! Both strategies share one top-level state machine:
//!
//! ```text
//! IDLE -> LOCK_CHECK -> { ABORTED | RUNNING } -> { COMPLETED | FAILED }
//! ```
//!
//! A held lock aborts the run before anything is written. Once the lock is
//! taken, every error is caught at the strategy boundary and the lock is
//! released before the run reports [`RunOutcome::Failed`]. Release is cleanup,
//! not rollback: partitions written before the failure stay written.

mod full_rebuild;
mod incremental;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use strata_core::observability::run_span;
use strata_core::storage_keys::LockKey;
use strata_core::StorageBackend;
use tracing::Instrument;
use ulid::Ulid;

use crate::codec::decode_delimited;
use crate::config::{EtlConfig, UnparseableDatePolicy};
use crate::coordinator::RunCoordinator;
use crate::error::{EtlError, Result};
use crate::metrics;
use crate::partition::PartitionDate;
use crate::partition_store::PartitionStore;
use crate::record::Record;

/// The two ways of materializing partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Clear the namespace and rebuild every partition from all source files.
    FullRebuild,
    /// Fold unprocessed source files into existing partitions.
    Incremental,
}

impl StrategyKind {
    /// Both strategies, in the order [`EtlEngine::run_all`] runs them.
    pub const ALL: [Self; 2] = [Self::FullRebuild, Self::Incremental];

    /// Returns the strategy name used in logs, metrics, and the lock body.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullRebuild => "full_rebuild",
            Self::Incremental => "incremental",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full-rebuild" | "full_rebuild" | "full" => Ok(Self::FullRebuild),
            "incremental" | "inc" => Ok(Self::Incremental),
            other => Err(EtlError::config(format!(
                "unknown strategy '{other}' (expected full-rebuild or incremental)"
            ))),
        }
    }
}

/// Why a run stopped before doing any work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The run lock was already held.
    LockHeld {
        /// Holder ID from the sentinel, if readable.
        holder: Option<String>,
    },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockHeld { holder } => write!(
                f,
                "run lock is held by {}",
                holder.as_deref().unwrap_or("an unknown holder")
            ),
        }
    }
}

/// Counters describing a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Strategy that ran.
    pub strategy: StrategyKind,
    /// Unique ID of this run.
    pub run_id: String,
    /// Source files decoded and folded into partitions.
    pub files_processed: usize,
    /// Source files skipped because the ledger already lists them.
    pub files_skipped: usize,
    /// Rows decoded from source files.
    pub rows_read: usize,
    /// Partition snapshots written, the quarantine partition included.
    pub partitions_written: usize,
    /// Rows across all written snapshots.
    pub rows_written: usize,
    /// Rows with an unparseable `c7` routed to quarantine.
    pub rows_quarantined: usize,
    /// Rows with an unparseable `c7` discarded.
    pub rows_dropped: usize,
    /// Wall-clock time from lock check to release.
    pub elapsed: Duration,
}

impl RunReport {
    fn new(strategy: StrategyKind, run_id: String) -> Self {
        Self {
            strategy,
            run_id,
            files_processed: 0,
            files_skipped: 0,
            rows_read: 0,
            partitions_written: 0,
            rows_written: 0,
            rows_quarantined: 0,
            rows_dropped: 0,
            elapsed: Duration::ZERO,
        }
    }

    fn record_partition(&mut self, rows: usize) {
        self.partitions_written += 1;
        self.rows_written += rows;
        metrics::record_partition_written(self.strategy.as_str(), rows as u64);
    }

    fn record_file(&mut self, rows: usize) {
        self.files_processed += 1;
        self.rows_read += rows;
        metrics::record_file_processed(self.strategy.as_str(), rows as u64);
    }
}

/// Result of one strategy invocation.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every source file was processed and the lock released.
    Completed(RunReport),
    /// The run did nothing because the lock was held.
    Aborted(AbortReason),
    /// The run hit a fatal error; the lock was released.
    Failed(EtlError),
}

impl RunOutcome {
    /// Returns `completed`, `aborted`, or `failed`.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Aborted(_) => "aborted",
            Self::Failed(_) => "failed",
        }
    }

    /// Returns true for [`RunOutcome::Failed`].
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns the report of a completed run.
    #[must_use]
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Runs strategies against a source and a target store.
pub struct EtlEngine {
    config: EtlConfig,
    source: Arc<dyn StorageBackend>,
    target: Arc<dyn StorageBackend>,
}

impl fmt::Debug for EtlEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EtlEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EtlEngine {
    /// Creates an engine over already-open stores.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` fails validation.
    pub fn new(
        config: EtlConfig,
        source: Arc<dyn StorageBackend>,
        target: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            target,
        })
    }

    /// Opens the configured stores and creates an engine.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails or a store cannot be opened.
    pub fn from_config(config: EtlConfig) -> Result<Self> {
        let source = config.source.open()?;
        let target = config.target.open()?;
        Self::new(config, source, target)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Returns the namespace a strategy writes to.
    #[must_use]
    pub fn namespace(&self, kind: StrategyKind) -> &str {
        match kind {
            StrategyKind::FullRebuild => &self.config.full_rebuild_namespace,
            StrategyKind::Incremental => &self.config.incremental_namespace,
        }
    }

    /// Returns a coordinator for a strategy's lock and ledger.
    #[must_use]
    pub fn coordinator(&self, kind: StrategyKind) -> RunCoordinator {
        RunCoordinator::new(
            self.target.clone(),
            LockKey::new(self.config.lock_key.trim_matches('/')),
            self.namespace(kind),
        )
    }

    /// Returns the partition store of a strategy's namespace.
    #[must_use]
    pub fn partition_store(&self, kind: StrategyKind) -> PartitionStore {
        PartitionStore::new(self.target.clone(), self.namespace(kind))
    }

    /// Lists source object paths under the configured prefix, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn list_source_files(&self) -> Result<Vec<String>> {
        let mut files: Vec<String> = self
            .source
            .list(&self.config.source_prefix)
            .await?
            .into_iter()
            .map(|meta| meta.path)
            .filter(|path| !path.ends_with('/'))
            .collect();
        files.sort();
        Ok(files)
    }

    async fn read_source(&self, path: &str) -> Result<Vec<Record>> {
        let bytes = self.source.get(path).await?;
        decode_delimited(&bytes).map_err(|e| e.in_object(path))
    }

    /// Applies the unparseable-date policy to one partition group.
    ///
    /// Returns `None` when the group must not be written.
    fn admit(
        &self,
        report: &mut RunReport,
        date: PartitionDate,
        rows: Vec<Record>,
    ) -> Option<Vec<Record>> {
        if date != PartitionDate::Unparseable {
            return Some(rows);
        }
        let strategy = report.strategy.as_str();
        match self.config.unparseable_dates {
            UnparseableDatePolicy::Quarantine => {
                report.rows_quarantined += rows.len();
                metrics::record_unparseable(strategy, "quarantined", rows.len() as u64);
                tracing::warn!(rows = rows.len(), "rows with unparseable c7 quarantined");
                Some(rows)
            }
            UnparseableDatePolicy::Drop => {
                report.rows_dropped += rows.len();
                metrics::record_unparseable(strategy, "dropped", rows.len() as u64);
                tracing::warn!(rows = rows.len(), "rows with unparseable c7 dropped");
                None
            }
        }
    }

    /// Runs one strategy under the run lock.
    ///
    /// Never returns with the lock held by this run, and never panics on
    /// storage or decode errors.
    pub async fn run(&self, kind: StrategyKind) -> RunOutcome {
        let run_id = Ulid::new().to_string();
        let span = run_span(kind.as_str(), &run_id);
        self.run_locked(kind, run_id).instrument(span).await
    }

    /// Runs the full rebuild, then the incremental strategy.
    ///
    /// The second strategy runs whatever the first one's outcome.
    pub async fn run_all(&self) -> Vec<(StrategyKind, RunOutcome)> {
        let mut outcomes = Vec::with_capacity(StrategyKind::ALL.len());
        for kind in StrategyKind::ALL {
            outcomes.push((kind, self.run(kind).await));
        }
        outcomes
    }

    async fn run_locked(&self, kind: StrategyKind, run_id: String) -> RunOutcome {
        let started = Instant::now();
        let coordinator = self.coordinator(kind);

        let outcome = match coordinator.is_locked().await {
            Err(e) => RunOutcome::Failed(e),
            Ok(true) => {
                let holder = coordinator
                    .lock_info()
                    .await
                    .ok()
                    .flatten()
                    .map(|info| info.holder_id);
                RunOutcome::Aborted(AbortReason::LockHeld { holder })
            }
            Ok(false) => match coordinator.acquire(kind.as_str()).await {
                Err(EtlError::LockHeld { holder }) => {
                    RunOutcome::Aborted(AbortReason::LockHeld { holder })
                }
                Err(e) => {
                    release_after_failure(&coordinator).await;
                    RunOutcome::Failed(e)
                }
                Ok(()) => {
                    let mut report = RunReport::new(kind, run_id);
                    let body = match kind {
                        StrategyKind::FullRebuild => {
                            full_rebuild::execute(self, &mut report).await
                        }
                        StrategyKind::Incremental => {
                            incremental::execute(self, &coordinator, &mut report).await
                        }
                    };
                    match body {
                        Ok(()) => match coordinator.release().await {
                            Ok(()) => {
                                report.elapsed = started.elapsed();
                                RunOutcome::Completed(report)
                            }
                            Err(e) => RunOutcome::Failed(e),
                        },
                        Err(e) => {
                            release_after_failure(&coordinator).await;
                            RunOutcome::Failed(e)
                        }
                    }
                }
            },
        };

        log_outcome(kind, &outcome);
        metrics::record_run(kind.as_str(), outcome.label(), started.elapsed().as_secs_f64());
        outcome
    }
}

async fn release_after_failure(coordinator: &RunCoordinator) {
    if let Err(e) = coordinator.release().await {
        tracing::error!(error = %e, "failed to release run lock after failure");
    }
}

fn log_outcome(kind: StrategyKind, outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Completed(report) => tracing::info!(
            files_processed = report.files_processed,
            files_skipped = report.files_skipped,
            rows_read = report.rows_read,
            partitions_written = report.partitions_written,
            rows_written = report.rows_written,
            rows_quarantined = report.rows_quarantined,
            rows_dropped = report.rows_dropped,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "{kind} run completed"
        ),
        RunOutcome::Aborted(reason) => tracing::warn!(%reason, "{kind} run aborted"),
        RunOutcome::Failed(error) => tracing::error!(%error, "{kind} run failed"),
    }
}
