//! Bounded transfer queue.
//!
//! A fixed pool of workers pulls [`TransferJob`]s from one FIFO channel, so at most
//! `concurrency` origin-fetch/store-write pairs are open at any time no matter how fast
//! jobs are submitted. Jobs start in submission order; they may complete out of order.
//!
//! Each outcome is sent back as soon as its job ends. A worker that panics loses only the
//! job it was running, and jobs still queued after every worker has stopped are reported
//! as failed rather than dropped.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::TransferError;
use crate::origin::Origin;
use crate::resolver::Candidate;
use crate::store::{ObjectStore, PutOptions};

/// A candidate together with where it goes in the target store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub candidate: Candidate,
    pub destination: String,
}

/// The result of one job. Failed jobs are not retried.
#[derive(Debug)]
pub enum TransferOutcome {
    Completed { destination: String, size: u64 },
    Failed {
        destination: String,
        error: TransferError,
    },
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Completed { .. })
    }
}

pub struct TransferQueue {
    sender: mpsc::Sender<TransferJob>,
    receiver: Arc<Mutex<mpsc::Receiver<TransferJob>>>,
    outcomes: mpsc::UnboundedReceiver<TransferOutcome>,
    workers: Vec<JoinHandle<()>>,
    concurrency: usize,
}

impl TransferQueue {
    /// Spawns `concurrency` workers (at least one) sharing the origin and store handles.
    /// Must be called from within a tokio runtime.
    pub fn new<O, S>(concurrency: usize, origin: Arc<O>, store: Arc<S>) -> Self
    where
        O: Origin + ?Sized + 'static,
        S: ObjectStore + ?Sized + 'static,
    {
        let concurrency = concurrency.max(1);
        let (sender, receiver) = mpsc::channel(concurrency);
        let receiver = Arc::new(Mutex::new(receiver));
        let (outcome_tx, outcomes) = mpsc::unbounded_channel();
        let live = Arc::new(AtomicUsize::new(concurrency));

        let workers = (0..concurrency)
            .map(|worker| {
                let guard = LiveWorker {
                    live: Arc::clone(&live),
                    receiver: Arc::clone(&receiver),
                };
                let outcome_tx = outcome_tx.clone();
                let origin = Arc::clone(&origin);
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    run_worker(worker, guard, outcome_tx, origin, store).await
                })
            })
            .collect();

        Self {
            sender,
            receiver,
            outcomes,
            workers,
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Enqueues a job, waiting while the queue is full. Gives the job back if every
    /// worker has stopped.
    pub async fn submit(&self, job: TransferJob) -> Result<(), TransferJob> {
        self.sender.send(job).await.map_err(|e| e.0)
    }

    /// Closes the queue, lets the workers drain it, and collects every outcome.
    pub async fn finish(self) -> Vec<TransferOutcome> {
        let TransferQueue {
            sender,
            receiver,
            mut outcomes,
            workers,
            ..
        } = self;
        drop(sender);

        let mut collected = Vec::new();
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "[TRANSFER] Worker task failed");
                collected.push(TransferOutcome::Failed {
                    destination: String::new(),
                    error: TransferError::Worker(e.to_string()),
                });
            }
        }

        // Every worker has stopped; whatever is left in the queue never ran.
        let mut receiver = receiver.lock().await;
        while let Ok(job) = receiver.try_recv() {
            error!(destination = %job.destination, "[TRANSFER][ERROR] No worker left for job");
            collected.push(TransferOutcome::Failed {
                destination: job.destination,
                error: TransferError::Worker("no worker left to run the job".to_owned()),
            });
        }

        while let Some(outcome) = outcomes.recv().await {
            collected.push(outcome);
        }
        collected
    }
}

/// Held by each worker task. The last one to stop, by return or by panic, closes the job
/// channel so `submit` fails instead of waiting for a worker that will never come.
struct LiveWorker {
    live: Arc<AtomicUsize>,
    receiver: Arc<Mutex<mpsc::Receiver<TransferJob>>>,
}

impl Drop for LiveWorker {
    fn drop(&mut self) {
        if self.live.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Ok(mut receiver) = self.receiver.try_lock() {
                receiver.close();
            }
        }
    }
}

async fn run_worker<O, S>(
    worker: usize,
    guard: LiveWorker,
    outcomes: mpsc::UnboundedSender<TransferOutcome>,
    origin: Arc<O>,
    store: Arc<S>,
) where
    O: Origin + ?Sized,
    S: ObjectStore + ?Sized,
{
    loop {
        let job = guard.receiver.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };
        let outcome = transfer_one(worker, &*origin, &*store, job).await;
        if outcomes.send(outcome).is_err() {
            break;
        }
    }
}

/// Streams one artifact from the origin straight into the store.
pub async fn transfer_one<O, S>(
    worker: usize,
    origin: &O,
    store: &S,
    job: TransferJob,
) -> TransferOutcome
where
    O: Origin + ?Sized,
    S: ObjectStore + ?Sized,
{
    let TransferJob {
        candidate,
        destination,
    } = job;
    info!(
        worker,
        source = %candidate.path,
        destination = %destination,
        size = candidate.size,
        "[TRANSFER] Syncing"
    );

    let result: Result<(), TransferError> = async {
        let body = origin.fetch(&candidate.path).await?;
        let options = PutOptions {
            size: Some(candidate.size),
            mkdirs: true,
        };
        store.put(&destination, body, options).await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => {
            info!(worker, destination = %destination, "[TRANSFER] Successfully put");
            TransferOutcome::Completed {
                destination,
                size: candidate.size,
            }
        }
        Err(error) => {
            error!(
                worker,
                destination = %destination,
                error = %error,
                "[TRANSFER][ERROR] Transfer failed"
            );
            TransferOutcome::Failed { destination, error }
        }
    }
}
