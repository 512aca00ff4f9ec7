//! Crawl orchestration.
//!
//! `Crawler` walks the planner span by span. Every span gets a fresh worker
//! pool sized to the span, its jobs are submitted in order from a separate
//! task, and the crawler waits until either the last job is committed or a
//! worker reports a failure. A failure cancels the span's run token through
//! the [`FatalErrorHandler`] and is returned to the caller.

use crate::fetch::capability::VersionedFetchers;
use crate::fetch::job::FetcherJob;
use crate::planner::{decompose_span, required_workers, BlockRange, CrawlPlanner};
use crate::pool::{PoolError, WorkerPool, WorkerPoolParams};
use crate::runtime::config::{CrawlConfig, DEFAULT_FROM_BLOCK};
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::progress::CrawlProgress;
use crate::runtime::telemetry::{self, Telemetry};
use crate::storage::{ChainHead, CommitSink, CursorStore};
use anyhow::{bail, ensure, Context, Result};
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Crawler {
    config: CrawlConfig,
    fetchers: VersionedFetchers,
    sink: Arc<dyn CommitSink>,
    cursor_store: Option<Arc<dyn CursorStore>>,
    chain_head: Option<Arc<dyn ChainHead>>,
    telemetry: Arc<Telemetry>,
    progress: Arc<CrawlProgress>,
    shutdown_root: CancellationToken,
}

/// What a finished (or interrupted) crawl accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub start_block: u64,
    /// Exclusive end block the crawl was heading for when it stopped.
    pub end_block: u64,
    pub spans: u64,
    pub jobs: u64,
    pub records: u64,
    pub last_committed_block: Option<u64>,
    /// Set when the root token was cancelled before the crawl finished.
    pub interrupted: bool,
}

enum SpanOutcome {
    Completed,
    Interrupted,
}

struct CrawlProgressReport {
    spans: u64,
    end_block: u64,
    interrupted: bool,
}

impl Crawler {
    /// Creates a crawler with its own root cancellation token.
    ///
    /// `fetchers` must either hold a single fetcher or one per version
    /// described by the configured boundaries.
    pub fn new(
        config: CrawlConfig,
        fetchers: VersionedFetchers,
        sink: Arc<dyn CommitSink>,
    ) -> Result<Self> {
        ensure!(!fetchers.is_empty(), "at least one fetcher is required");
        let versions = config.version_boundaries().version_count();
        ensure!(
            fetchers.len() == 1 || fetchers.len() == versions,
            "configured boundaries describe {versions} versions but {} fetchers were provided",
            fetchers.len()
        );

        Ok(Self {
            config,
            fetchers,
            sink,
            cursor_store: None,
            chain_head: None,
            telemetry: Arc::new(Telemetry::default()),
            progress: Arc::new(CrawlProgress::default()),
            shutdown_root: CancellationToken::new(),
        })
    }

    /// Reads the resume point from `store` when no start block is configured.
    pub fn with_cursor_store(mut self, store: Arc<dyn CursorStore>) -> Self {
        self.cursor_store = Some(store);
        self
    }

    /// Source of the latest block when no end block is configured.
    pub fn with_chain_head(mut self, head: Arc<dyn ChainHead>) -> Self {
        self.chain_head = Some(head);
        self
    }

    /// Derives every run token from `shutdown` instead of a private root.
    pub fn with_cancellation_token(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown_root = shutdown;
        self
    }

    /// Shares counters with source clients created outside the crawler.
    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn progress(&self) -> Arc<CrawlProgress> {
        self.progress.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_root.clone()
    }

    /// Crawls until the configured end, the root token is cancelled, or a
    /// job fails. Cancellation yields an interrupted summary; a job or
    /// commit failure is returned as an error after the pool has stopped.
    pub async fn run(&self) -> Result<CrawlSummary> {
        let start_block = self.resolve_start().await?;
        let end_block = self.resolve_end().await?;
        info!(
            start_block,
            end_block,
            span_blocks = self.config.span_blocks(),
            max_blocks = self.config.max_blocks(),
            max_workers = self.config.max_workers(),
            follow = self.config.follow_interval().is_some(),
            "starting crawl"
        );

        self.progress.reset(start_block);
        self.progress.set_target(end_block);
        let baseline = self.telemetry.snapshot();

        let metrics_token = self.shutdown_root.child_token();
        let metrics_handle = telemetry::spawn_metrics_reporter(
            self.telemetry.clone(),
            self.progress.clone(),
            metrics_token.clone(),
            self.config.metrics_interval(),
        );

        let result = self.crawl(start_block, end_block).await;

        metrics_token.cancel();
        if let Err(err) = metrics_handle.await {
            warn!(error = %err, "metrics reporter task panicked");
        }

        let report = result?;
        let snapshot = self.telemetry.snapshot();
        let summary = CrawlSummary {
            start_block,
            end_block: report.end_block,
            spans: report.spans,
            jobs: snapshot.committed_jobs - baseline.committed_jobs,
            records: snapshot.committed_records - baseline.committed_records,
            last_committed_block: self.progress.last_committed(),
            interrupted: report.interrupted,
        };

        if summary.interrupted {
            info!(
                last_committed_block = ?summary.last_committed_block,
                jobs = summary.jobs,
                records = summary.records,
                "crawl interrupted"
            );
        } else {
            info!(
                last_committed_block = ?summary.last_committed_block,
                spans = summary.spans,
                jobs = summary.jobs,
                records = summary.records,
                "crawl finished"
            );
        }
        Ok(summary)
    }

    async fn crawl(&self, start_block: u64, end_block: u64) -> Result<CrawlProgressReport> {
        let mut planner = CrawlPlanner::new(start_block, end_block, self.config.span_blocks());
        let mut spans = 0;

        loop {
            if let Some(span) = planner.next_span() {
                match self.crawl_span(span).await? {
                    SpanOutcome::Completed => spans += 1,
                    SpanOutcome::Interrupted => {
                        return Ok(CrawlProgressReport {
                            spans,
                            end_block: planner.end(),
                            interrupted: true,
                        })
                    }
                }
                continue;
            }

            let Some(interval) = self.config.follow_interval() else {
                break;
            };

            debug!(next_block = planner.cursor(), "caught up with chain head; waiting for new blocks");
            tokio::select! {
                _ = sleep(interval) => {}
                _ = self.shutdown_root.cancelled() => {
                    return Ok(CrawlProgressReport {
                        spans,
                        end_block: planner.end(),
                        interrupted: true,
                    });
                }
            }

            let end_block = self.resolve_end().await?;
            planner.extend_to(end_block);
            self.progress.set_target(planner.end());
        }

        Ok(CrawlProgressReport {
            spans,
            end_block: planner.end(),
            interrupted: false,
        })
    }

    async fn crawl_span(&self, span: BlockRange) -> Result<SpanOutcome> {
        if self.shutdown_root.is_cancelled() {
            return Ok(SpanOutcome::Interrupted);
        }

        let max_blocks = self.config.max_blocks();
        let planned = decompose_span(span, max_blocks, self.config.version_boundaries());
        let Some(last_order) = planned.last().map(|job| job.order) else {
            return Ok(SpanOutcome::Completed);
        };
        let workers = required_workers(
            span.from_block(),
            span.last_block(),
            max_blocks,
            self.config.max_workers(),
        )
        .max(1);

        info!(%span, jobs = planned.len(), workers, "crawling span");

        let run_token = self.shutdown_root.child_token();
        let fatal_handler = FatalErrorHandler::new(run_token.clone());
        let mut pool = WorkerPool::launch(WorkerPoolParams {
            workers,
            sink: self.sink.clone(),
            telemetry: self.telemetry.clone(),
            progress: self.progress.clone(),
            run_token: run_token.clone(),
        });
        let gate = pool.gate();

        let jobs: Vec<FetcherJob> = planned
            .into_iter()
            .map(|job| {
                FetcherJob::new(
                    job,
                    self.fetchers.for_version(job.version),
                    self.config.attempts(),
                    self.config.retry_delay(),
                )
                .with_telemetry(self.telemetry.clone())
            })
            .collect();

        let submitter = pool.submitter();
        let submit_handle = tokio::spawn(async move {
            for job in jobs {
                let order = job.order();
                submitter
                    .submit(job)
                    .await
                    .with_context(|| format!("failed to submit job {order}"))?;
            }
            anyhow::Ok(())
        });

        let outcome = tokio::select! {
            biased;
            done = gate.wait_until_completed(last_order, &run_token) => done,
            error = pool.next_error() => Err(error.unwrap_or_else(|| PoolError::WorkersExited.into())),
        };

        let result = match outcome {
            Ok(()) => {
                info!(%span, "all jobs are successfully executed, waiting for the workers pool to shut down");
                Ok(SpanOutcome::Completed)
            }
            // Workers unwind on their own once the root is cancelled, so
            // whatever the pool reports then is a consequence of the cancel.
            Err(err) if self.shutdown_root.is_cancelled() => {
                debug!(%span, error = %format!("{err:#}"), "span stopped by cancellation");
                info!(%span, "crawl cancelled; stopping worker pool");
                Ok(SpanOutcome::Interrupted)
            }
            Err(err) => {
                let err = err.context(format!("failed to crawl span {span}"));
                Err(fatal_handler.trigger("worker pool", err))
            }
        };

        pool.shutdown().await;
        match submit_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!(error = %format!("{err:#}"), "job submission stopped early"),
            Err(err) => warn!(error = %err, "job submitter task failed to join"),
        }
        run_token.cancel();

        result
    }

    async fn resolve_start(&self) -> Result<u64> {
        if let Some(block) = self.config.from_block() {
            return Ok(block);
        }

        if let Some(store) = &self.cursor_store {
            let cursor = store
                .last_committed_block()
                .await
                .context("failed to read the crawl cursor")?;
            if let Some(cursor) = cursor {
                info!(cursor, "resuming after stored cursor");
                return Ok(cursor.saturating_add(1));
            }
        }

        Ok(DEFAULT_FROM_BLOCK)
    }

    async fn resolve_end(&self) -> Result<u64> {
        if let Some(block) = self.config.to_block() {
            return Ok(block);
        }

        let Some(head) = &self.chain_head else {
            bail!("to_block is not configured and no chain head source was provided");
        };
        let latest = head
            .latest_block()
            .await
            .context("failed to read the chain head")?;
        Ok(latest.saturating_sub(self.config.confirmations()))
    }
}
