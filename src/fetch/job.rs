use crate::fetch::capability::FetchCapability;
use crate::fetch::error::FetchError;
use crate::fetch::retry::RetryPolicy;
use crate::planner::{BlockRange, PlannedJob};
use crate::records::Record;
use crate::runtime::hooks::HookDecision;
use crate::runtime::telemetry::Telemetry;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A block range bound to the fetcher for its version, retried a fixed
/// number of times with a constant delay.
#[derive(Clone)]
pub struct FetcherJob {
    order: u64,
    range: BlockRange,
    version: usize,
    attempts: usize,
    retry_delay: Duration,
    fetcher: Arc<dyn FetchCapability>,
    telemetry: Option<Arc<Telemetry>>,
}

impl FetcherJob {
    pub fn new(
        planned: PlannedJob,
        fetcher: Arc<dyn FetchCapability>,
        attempts: usize,
        retry_delay: Duration,
    ) -> Self {
        Self {
            order: planned.order,
            range: planned.range,
            version: planned.version,
            attempts: attempts.max(1),
            retry_delay,
            fetcher,
            telemetry: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn range(&self) -> BlockRange {
        self.range
    }

    pub fn version(&self) -> usize {
        self.version
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Fetches the job's range. Malformed requests fail immediately;
    /// anything else is retried until the attempt budget is spent, after
    /// which the last error is returned.
    pub async fn execute(&self, cancellation: &CancellationToken) -> Result<Vec<Record>> {
        let order = self.order;
        let range = self.range;
        let attempts = self.attempts;

        let policy = RetryPolicy::new(attempts, self.retry_delay);

        let result = policy
            .run(
                cancellation,
                |attempt| {
                    let fetcher = Arc::clone(&self.fetcher);
                    async move {
                        debug!(order, %range, attempt, fetcher = fetcher.label(), "fetching job range");
                        let decision = tokio::select! {
                            result = fetcher.fetch(range) => HookDecision::Finished(result),
                            _ = cancellation.cancelled() => HookDecision::Cancelled,
                        };
                        match decision {
                            HookDecision::Finished(result) => result,
                            HookDecision::Cancelled => Err(FetchError::Cancelled.into()),
                        }
                    }
                },
                |failed| {
                    if let Some(telemetry) = &self.telemetry {
                        telemetry.record_failed_attempt();
                    }
                    if failed.will_retry {
                        warn!(
                            order,
                            %range,
                            attempt = failed.attempt,
                            attempts,
                            retry_in_ms = policy.delay().as_millis() as u64,
                            error = %failed.error,
                            "failed to execute job attempt"
                        );
                    } else {
                        warn!(order, %range, attempt = failed.attempt, error = %failed.error, "job attempts exhausted");
                    }
                },
            )
            .await;

        if result.is_err() {
            if let Some(telemetry) = &self.telemetry {
                telemetry.record_failed_job();
            }
        }
        result
    }
}

impl std::fmt::Debug for FetcherJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetcherJob")
            .field("order", &self.order)
            .field("range", &self.range)
            .field("version", &self.version)
            .field("attempts", &self.attempts)
            .field("retry_delay", &self.retry_delay)
            .field("fetcher", &self.fetcher.label())
            .finish()
    }
}
