//! Fixed-size worker pool for one span of the crawl.
//!
//! Jobs are handed over by rendezvous: an idle worker posts a one-shot slot,
//! [`JobSubmitter::submit`] fills the next free slot, so submission blocks
//! while every worker is busy. Finished jobs commit through the shared
//! [`CommitGate`] in job order. The first failure each worker hits is
//! delivered on a buffered error channel that never blocks the worker.

use crate::fetch::error::FetchError;
use crate::fetch::job::FetcherJob;
use crate::pool::gate::CommitGate;
use crate::pool::worker::{report_error, JobSlot, Worker, WorkerContext};
use crate::pool::PoolError;
use crate::runtime::progress::CrawlProgress;
use crate::runtime::telemetry::Telemetry;
use crate::storage::CommitSink;
use anyhow::Result;
use futures::FutureExt;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct WorkerPoolParams {
    pub workers: usize,
    pub sink: Arc<dyn CommitSink>,
    pub telemetry: Arc<Telemetry>,
    pub progress: Arc<CrawlProgress>,
    /// Cancelled when the run must stop; workers, submitters, and commit
    /// waits all observe it.
    pub run_token: CancellationToken,
}

pub struct WorkerPool {
    size: usize,
    workers: Vec<JoinHandle<()>>,
    slots: Arc<Mutex<mpsc::Receiver<JobSlot>>>,
    errors_rx: mpsc::Receiver<anyhow::Error>,
    gate: Arc<CommitGate>,
    run_token: CancellationToken,
}

/// Cloneable handle that feeds jobs to idle workers.
#[derive(Clone)]
pub struct JobSubmitter {
    slots: Arc<Mutex<mpsc::Receiver<JobSlot>>>,
    cancellation: CancellationToken,
}

impl WorkerPool {
    pub fn launch(params: WorkerPoolParams) -> Self {
        let size = params.workers.max(1);
        let (slots_tx, slots_rx) = mpsc::channel::<JobSlot>(size);
        let (errors_tx, errors_rx) = mpsc::channel(size * 2);
        let gate = Arc::new(CommitGate::new());

        params.telemetry.record_worker_pool_size(size);

        let mut workers = Vec::with_capacity(size);
        for worker_id in 0..size {
            let worker = Worker::new(
                worker_id,
                WorkerContext {
                    slots: slots_tx.clone(),
                    gate: gate.clone(),
                    sink: params.sink.clone(),
                    errors: errors_tx.clone(),
                    telemetry: params.telemetry.clone(),
                    progress: params.progress.clone(),
                    shutdown: params.run_token.clone(),
                },
            );
            let errors = errors_tx.clone();

            let handle = tokio::spawn(async move {
                let result = std::panic::AssertUnwindSafe(worker.run())
                    .catch_unwind()
                    .await;

                if let Err(panic_payload) = result {
                    let message = panic_message(panic_payload.as_ref());
                    tracing::error!(worker = worker_id, panic = %message, "worker task panicked");
                    report_error(
                        &errors,
                        worker_id,
                        PoolError::WorkerPanicked {
                            worker: worker_id,
                            message,
                        }
                        .into(),
                    );
                }
            });
            workers.push(handle);
        }

        tracing::debug!(workers = size, "worker pool launched");

        Self {
            size,
            workers,
            slots: Arc::new(Mutex::new(slots_rx)),
            errors_rx,
            gate,
            run_token: params.run_token,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn gate(&self) -> Arc<CommitGate> {
        self.gate.clone()
    }

    pub fn submitter(&self) -> JobSubmitter {
        JobSubmitter {
            slots: self.slots.clone(),
            cancellation: self.run_token.clone(),
        }
    }

    /// Next reported worker failure. `None` once every worker has exited.
    pub async fn next_error(&mut self) -> Option<anyhow::Error> {
        self.errors_rx.recv().await
    }

    /// Closes the hand-off and waits for every worker to exit. Workers still
    /// busy with a job finish it unless the run token has been cancelled.
    pub async fn shutdown(mut self) {
        {
            let mut slots = self.slots.lock().await;
            slots.close();
            while slots.try_recv().is_ok() {}
        }

        for (worker_id, handle) in self.workers.drain(..).enumerate() {
            if let Err(err) = handle.await {
                tracing::warn!(worker = worker_id, error = %err, "worker task failed to join");
            }
        }

        while let Ok(err) = self.errors_rx.try_recv() {
            tracing::debug!(error = %format!("{err:#}"), "discarding error reported during shutdown");
        }
        tracing::debug!(workers = self.size, "worker pool stopped");
    }
}

impl JobSubmitter {
    /// Hands `job` to the next idle worker, waiting while all are busy.
    pub async fn submit(&self, job: FetcherJob) -> Result<()> {
        let mut job = job;
        loop {
            let slot = {
                let mut slots = self.slots.lock().await;
                tokio::select! {
                    slot = slots.recv() => slot,
                    _ = self.cancellation.cancelled() => return Err(FetchError::Cancelled.into()),
                }
            };

            let Some(slot) = slot else {
                return Err(PoolError::WorkersExited.into());
            };

            // A worker that gave up its slot hands the job back.
            match slot.send(job) {
                Ok(()) => return Ok(()),
                Err(returned) => job = returned,
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
