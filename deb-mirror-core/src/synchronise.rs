//! High-level pipeline: index → records → candidates → checks → transfers.
//!
//! [`synchronise`] fetches one index from the origin and tees the body: one branch is
//! archived verbatim into the target store, the other is decoded, parsed and resolved
//! into candidates. Each candidate is checked against the store and, if missing or
//! stale, handed to the bounded [`TransferQueue`].
//!
//! # Responsibilities
//! - Pull-driven: one record at a time flows into the checker, and `submit` waits while
//!   the queue is full, so pending checks never pile up ahead of the transfer stage.
//! - Per-candidate isolation: a failed resolve, check or transfer is recorded in the
//!   [`SynchroniseReport`] and the run carries on with independent candidates.
//! - A parse error stops record consumption; transfers already queued and the archive
//!   write still finish.
//!
//! # Error Handling
//! Only problems that stop the run before any work is possible (invalid config, index
//! fetch failure) are returned as `Err`. Everything else ends up in the report, and
//! [`SynchroniseReport::status`] condenses it into a [`RunStatus`].

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::checker::{check, CheckOutcome};
use crate::decode::{index_lines, tee};
use crate::error::MirrorError;
use crate::origin::Origin;
use crate::parser::RecordStream;
use crate::resolver::resolve;
use crate::store::{join_store_path, ObjectStore, PutOptions};
use crate::transfer::{TransferJob, TransferOutcome, TransferQueue};

pub use crate::config::{OriginConfig, SynchroniseConfig, TargetConfig};

/// Chunks buffered per tee branch.
const TEE_BUFFER: usize = 8;

/// Which stage a failed item fell over in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Resolve,
    Check,
    Transfer,
    Archive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub path: String,
    pub stage: FailureStage,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ArchiveStatus {
    /// Dry run: the index was not archived.
    #[default]
    Skipped,
    Written { path: String },
    Failed { path: String },
}

/// Condensed result of a run, in order of precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// The index could not be parsed (or a record could not be resolved).
    ParseFailed,
    /// At least one existence/checksum lookup failed.
    CheckFailed,
    /// At least one artifact or archive write failed.
    TransferFailed,
}

impl RunStatus {
    /// Process exit status. 1 is left for setup errors reported by the caller.
    pub fn code(self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::CheckFailed => 2,
            RunStatus::TransferFailed => 3,
            RunStatus::ParseFailed => 4,
        }
    }
}

/// Everything a run did, for logging and the exit status.
#[derive(Debug, Default)]
pub struct SynchroniseReport {
    pub index_path: String,
    pub lines_read: u64,
    pub records: u64,
    pub records_dropped: u64,
    pub candidates: u64,
    pub up_to_date: u64,
    pub missing: u64,
    pub mismatched: u64,
    pub enqueued: u64,
    pub transferred: u64,
    /// Same destination and checksum seen again; skipped.
    pub duplicates: u64,
    /// Same destination with a different checksum; the later one is skipped.
    pub collisions: u64,
    pub archive: ArchiveStatus,
    pub parse_error: Option<String>,
    pub failures: Vec<FailedItem>,
}

impl SynchroniseReport {
    pub fn status(&self) -> RunStatus {
        let failed_in = |stage: FailureStage| self.failures.iter().any(|f| f.stage == stage);
        if self.parse_error.is_some() || failed_in(FailureStage::Resolve) {
            RunStatus::ParseFailed
        } else if failed_in(FailureStage::Check) {
            RunStatus::CheckFailed
        } else if failed_in(FailureStage::Transfer) || failed_in(FailureStage::Archive) {
            RunStatus::TransferFailed
        } else {
            RunStatus::Success
        }
    }

    fn fail(&mut self, path: impl Into<String>, stage: FailureStage, message: impl ToString) {
        self.failures.push(FailedItem {
            path: path.into(),
            stage,
            message: message.to_string(),
        });
    }
}

/// Entrypoint: mirror one index and the artifacts it lists.
pub async fn synchronise<O, S>(
    config: &SynchroniseConfig,
    origin: Arc<O>,
    store: Arc<S>,
) -> Result<SynchroniseReport, MirrorError>
where
    O: Origin + ?Sized + 'static,
    S: ObjectStore + ?Sized + 'static,
{
    config.validate()?;
    let dry_run = config.target.dry_run;
    let index_path = config.origin.index_path();
    let mut report = SynchroniseReport {
        index_path: index_path.clone(),
        ..Default::default()
    };

    info!(index = %index_path, "[SYNC] Getting index");
    let body = origin.fetch(&index_path).await.map_err(|source| {
        error!(index = %index_path, error = %source, "[SYNC][ERROR] Index fetch failed");
        MirrorError::IndexFetch {
            path: index_path.clone(),
            source,
        }
    })?;

    let (archive_body, parse_body) = tee(body, TEE_BUFFER);
    let archive = if dry_run {
        drop(archive_body);
        None
    } else {
        let archive_path = config.archive_path();
        let store = Arc::clone(&store);
        Some(tokio::spawn(async move {
            let options = PutOptions {
                size: None,
                mkdirs: true,
            };
            let result = store.put(&archive_path, archive_body, options).await;
            (archive_path, result)
        }))
    };

    let queue = (!dry_run).then(|| {
        TransferQueue::new(
            config.target.concurrency,
            Arc::clone(&origin),
            Arc::clone(&store),
        )
    });

    let mut records = RecordStream::new(
        index_lines(parse_body, config.origin.compression),
        config.origin.boundary(),
    );
    // Destination -> checksum of the first candidate. One entry per distinct artifact
    // path for the whole run; record bodies are not kept.
    let mut seen: HashMap<String, String> = HashMap::new();

    while let Some(next) = records.next().await {
        let record = match next {
            Ok(record) => record,
            Err(e) => {
                error!(error = %e, "[SYNC][ERROR] Index parse failed, no further records");
                report.parse_error = Some(e.to_string());
                break;
            }
        };
        report.records += 1;

        let candidates = match resolve(&record) {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(
                    record = %record.label(),
                    error = %e,
                    "[SYNC][ERROR] Record could not be resolved"
                );
                report.fail(record.label(), FailureStage::Resolve, e);
                continue;
            }
        };

        for candidate in candidates {
            report.candidates += 1;
            let destination = join_store_path(&config.target.base_path, &candidate.path);

            match seen.get(&destination) {
                Some(previous) if *previous == candidate.checksum => {
                    debug!(destination = %destination, "[SYNC] Duplicate candidate skipped");
                    report.duplicates += 1;
                    continue;
                }
                Some(previous) => {
                    warn!(
                        destination = %destination,
                        kept = %previous,
                        skipped = %candidate.checksum,
                        "[SYNC] Destination collision, keeping the first candidate"
                    );
                    report.collisions += 1;
                    continue;
                }
                None => {
                    seen.insert(destination.clone(), candidate.checksum.clone());
                }
            }

            let outcome = match check(&*store, &candidate, &destination).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        destination = %destination,
                        error = %e,
                        "[SYNC][ERROR] Existence check failed"
                    );
                    report.fail(destination, FailureStage::Check, e);
                    continue;
                }
            };
            match outcome {
                CheckOutcome::UpToDate => {
                    report.up_to_date += 1;
                    continue;
                }
                CheckOutcome::Missing => report.missing += 1,
                CheckOutcome::Mismatch { .. } => report.mismatched += 1,
            }

            let Some(queue) = &queue else {
                info!(destination = %destination, "[SYNC] Dry run, would transfer");
                continue;
            };
            match queue.submit(TransferJob { candidate, destination }).await {
                Ok(()) => report.enqueued += 1,
                Err(job) => {
                    error!(destination = %job.destination, "[SYNC][ERROR] Transfer queue closed");
                    report.fail(job.destination, FailureStage::Transfer, "transfer queue closed");
                }
            }
        }
    }

    let stats = records.stats();
    drop(records);
    report.lines_read = stats.lines_read;
    report.records_dropped = stats.records_dropped;

    if let Some(queue) = queue {
        info!(enqueued = report.enqueued, "[SYNC] Waiting for transfers");
        for outcome in queue.finish().await {
            match outcome {
                TransferOutcome::Completed { .. } => report.transferred += 1,
                TransferOutcome::Failed { destination, error } => {
                    report.fail(destination, FailureStage::Transfer, error)
                }
            }
        }
    }

    if let Some(handle) = archive {
        match handle.await {
            Ok((path, Ok(()))) => {
                info!(path = %path, "[SYNC] Put index file");
                report.archive = ArchiveStatus::Written { path };
            }
            Ok((path, Err(e))) => {
                error!(path = %path, error = %e, "[SYNC][ERROR] Failed to put index file");
                report.fail(path.clone(), FailureStage::Archive, e);
                report.archive = ArchiveStatus::Failed { path };
            }
            Err(e) => {
                let path = config.archive_path();
                error!(path = %path, error = %e, "[SYNC][ERROR] Archive task failed");
                report.fail(path.clone(), FailureStage::Archive, e);
                report.archive = ArchiveStatus::Failed { path };
            }
        }
    }

    info!(
        records = report.records,
        dropped = report.records_dropped,
        candidates = report.candidates,
        up_to_date = report.up_to_date,
        transferred = report.transferred,
        failures = report.failures.len(),
        status = ?report.status(),
        "[SYNC] Synchronisation finished"
    );
    Ok(report)
}
