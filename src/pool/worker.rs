use crate::fetch::error::FetchError;
use crate::fetch::job::FetcherJob;
use crate::pool::gate::CommitGate;
use crate::pool::PoolError;
use crate::runtime::progress::CrawlProgress;
use crate::runtime::telemetry::Telemetry;
use crate::storage::CommitSink;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// An idle worker's offer to take exactly one job.
pub(crate) type JobSlot = oneshot::Sender<FetcherJob>;

pub(crate) struct WorkerContext {
    pub slots: mpsc::Sender<JobSlot>,
    pub gate: Arc<CommitGate>,
    pub sink: Arc<dyn CommitSink>,
    pub errors: mpsc::Sender<anyhow::Error>,
    pub telemetry: Arc<Telemetry>,
    pub progress: Arc<CrawlProgress>,
    pub shutdown: CancellationToken,
}

pub(crate) struct Worker {
    id: usize,
    ctx: WorkerContext,
}

impl Worker {
    pub(crate) fn new(id: usize, ctx: WorkerContext) -> Self {
        Self { id, ctx }
    }

    /// Takes jobs until the pool closes, the run is cancelled, or a job
    /// fails. A failure is reported once on the error channel and ends the
    /// worker.
    pub(crate) async fn run(self) {
        debug!(worker = self.id, "worker started");

        while let Some(job) = self.next_job().await {
            let order = job.order();
            match self.handle_job(job).await {
                Ok(()) => {}
                Err(err) if FetchError::is_cancelled(&err) => {
                    debug!(worker = self.id, order, "worker cancelled while handling job");
                    break;
                }
                Err(err) => {
                    error!(
                        worker = self.id,
                        order,
                        error = %format!("{err:#}"),
                        "worker failed to handle job"
                    );
                    report_error(&self.ctx.errors, self.id, err);
                    break;
                }
            }
        }

        debug!(worker = self.id, "worker stopped");
    }

    async fn next_job(&self) -> Option<FetcherJob> {
        let (slot_tx, slot_rx) = oneshot::channel();

        tokio::select! {
            sent = self.ctx.slots.send(slot_tx) => {
                if sent.is_err() {
                    debug!(worker = self.id, "job hand-off closed");
                    return None;
                }
            }
            _ = self.ctx.shutdown.cancelled() => return None,
        }

        tokio::select! {
            job = slot_rx => job.ok(),
            _ = self.ctx.shutdown.cancelled() => None,
        }
    }

    async fn handle_job(&self, job: FetcherJob) -> Result<()> {
        let worker = self.id;
        let order = job.order();
        let range = job.range();

        info!(worker, order, %range, version = job.version(), "executing fetcher job");
        let records = job
            .execute(&self.ctx.shutdown)
            .await
            .with_context(|| PoolError::JobFailed { worker, order })?;

        let count = records.len() as u64;
        debug!(worker, order, records = count, "fetcher job executed; waiting for commit turn");

        let turn = self.ctx.gate.wait_for_turn(order, &self.ctx.shutdown).await?;
        self.ctx
            .sink
            .commit(range, records)
            .await
            .with_context(|| PoolError::CommitFailed { worker, order })?;
        turn.complete();

        self.ctx.telemetry.record_commit(range.len(), count);
        self.ctx.progress.mark_committed(range.last_block());
        info!(worker, order, %range, records = count, "committed fetcher job");
        Ok(())
    }
}

pub(crate) fn report_error(errors: &mpsc::Sender<anyhow::Error>, worker: usize, err: anyhow::Error) {
    if let Err(send_err) = errors.try_send(err) {
        warn!(worker, error = %send_err, "dropping worker error; error channel unavailable");
    }
}
