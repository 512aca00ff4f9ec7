use anyhow::Error as AnyError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stops a crawl run on its first fatal error. Triggering it cancels the
/// run token so every worker, submitter, and commit wait unwinds at its next
/// suspension point. The parent token is left alone; deciding whether to
/// terminate the process belongs to the caller, which receives the error back.
#[derive(Clone)]
pub struct FatalErrorHandler {
    inner: Arc<FatalInner>,
}

struct FatalInner {
    triggered: AtomicBool,
    run_shutdown: CancellationToken,
}

impl FatalErrorHandler {
    pub fn new(run_shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(FatalInner {
                triggered: AtomicBool::new(false),
                run_shutdown,
            }),
        }
    }

    /// Logs `error` and cancels the run the first time it is called. The
    /// error is always handed back so the caller can propagate it.
    pub fn trigger(&self, context: &str, error: AnyError) -> AnyError {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            return error;
        }

        tracing::error!(
            context,
            error = %format!("{error:#}"),
            "fatal crawl error; cancelling run"
        );
        self.inner.run_shutdown.cancel();

        error
    }
}
