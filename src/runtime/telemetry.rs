use crate::runtime::progress::CrawlProgress;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters shared by workers, jobs, and source clients.
#[derive(Default, Debug)]
pub struct Telemetry {
    committed_jobs: AtomicU64,
    committed_blocks: AtomicU64,
    committed_records: AtomicU64,
    failed_attempts: AtomicU64,
    failed_jobs: AtomicU64,
    rpc_errors: AtomicU64,
    rpc_timeouts: AtomicU64,
    worker_pool_size: AtomicUsize,
    worker_pools_started: AtomicU64,
}

impl Telemetry {
    pub fn record_commit(&self, blocks: u64, records: u64) {
        self.committed_jobs.fetch_add(1, Ordering::Relaxed);
        self.committed_blocks.fetch_add(blocks, Ordering::Relaxed);
        self.committed_records.fetch_add(records, Ordering::Relaxed);
    }

    pub fn record_failed_attempt(&self) {
        self.failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_job(&self) {
        self.failed_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rpc_error(&self) {
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rpc_timeout(&self) {
        self.rpc_timeouts.fetch_add(1, Ordering::Relaxed);
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_pool_size(&self, workers: usize) {
        self.worker_pool_size.store(workers, Ordering::Relaxed);
        self.worker_pools_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_pool_size(&self) -> usize {
        self.worker_pool_size.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            committed_jobs: self.committed_jobs.load(Ordering::Relaxed),
            committed_blocks: self.committed_blocks.load(Ordering::Relaxed),
            committed_records: self.committed_records.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            failed_jobs: self.failed_jobs.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            rpc_timeouts: self.rpc_timeouts.load(Ordering::Relaxed),
            worker_pools_started: self.worker_pools_started.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub committed_jobs: u64,
    pub committed_blocks: u64,
    pub committed_records: u64,
    pub failed_attempts: u64,
    pub failed_jobs: u64,
    pub rpc_errors: u64,
    pub rpc_timeouts: u64,
    pub worker_pools_started: u64,
}

/// Spawns a background task that periodically logs block throughput,
/// commit progress, and failure counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    progress: Arc<CrawlProgress>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "blockcrawl::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let blocks_delta = current_snapshot
                        .committed_blocks
                        .saturating_sub(last_snapshot.committed_blocks);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        blocks_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "blockcrawl::metrics",
                        blocks_per_sec = format!("{throughput:.2}"),
                        last_committed = ?progress.last_committed(),
                        remaining = ?progress.remaining_blocks(),
                        jobs = current_snapshot.committed_jobs,
                        records = current_snapshot.committed_records,
                        workers = telemetry.worker_pool_size(),
                        failed_attempts = current_snapshot.failed_attempts,
                        failed_jobs = current_snapshot.failed_jobs,
                        rpc_errors = current_snapshot.rpc_errors,
                        rpc_timeouts = current_snapshot.rpc_timeouts,
                        "crawl metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
