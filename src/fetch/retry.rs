use crate::fetch::error::FetchError;
use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Attempt budget with a constant pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    attempts: usize,
    delay: Duration,
}

/// One failed attempt, handed to the caller before the next one starts.
pub(crate) struct FailedAttempt<'e> {
    pub attempt: usize,
    pub error: &'e anyhow::Error,
    pub will_retry: bool,
}

impl RetryPolicy {
    pub(crate) fn new(attempts: usize, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub(crate) fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `operation` until it succeeds or the budget is spent, returning
    /// the last error on exhaustion. Malformed and cancelled errors end the
    /// loop at once and are not reported to `on_failure`.
    pub(crate) async fn run<T, F, Fut, L>(
        &self,
        cancellation: &CancellationToken,
        mut operation: F,
        mut on_failure: L,
    ) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
        L: FnMut(FailedAttempt<'_>),
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancellation.is_cancelled() {
                return Err(FetchError::Cancelled.into());
            }

            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if FetchError::is_malformed(&error) || FetchError::is_cancelled(&error) {
                return Err(error);
            }

            let will_retry = attempt < self.attempts;
            on_failure(FailedAttempt {
                attempt,
                error: &error,
                will_retry,
            });
            if !will_retry {
                return Err(error);
            }

            tokio::select! {
                _ = cancellation.cancelled() => return Err(FetchError::Cancelled.into()),
                _ = sleep(self.delay) => {}
            }
        }
    }
}
