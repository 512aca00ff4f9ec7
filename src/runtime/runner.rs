use crate::orchestrator::{CrawlSummary, Crawler};
use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Drives a [`Crawler`] and turns OS signals into graceful cancellation.
pub struct Runner {
    crawler: Crawler,
    shutdown: CancellationToken,
}

enum Interrupt {
    CtrlC,
    SignalUnavailable(std::io::Error),
}

impl Runner {
    /// Wires a fresh root [`CancellationToken`] into the crawler; every
    /// span's run token derives from it.
    pub fn new(crawler: Crawler) -> Self {
        let shutdown = CancellationToken::new();
        let crawler = crawler.with_cancellation_token(shutdown.clone());
        Self { crawler, shutdown }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn crawler(&self) -> &Crawler {
        &self.crawler
    }

    /// Runs the crawl to completion or until the root token is cancelled.
    pub async fn run(&self) -> Result<CrawlSummary> {
        self.crawler.run().await
    }

    /// Like [`Runner::run`], additionally cancelling the crawl on Ctrl-C
    /// (SIGINT). Committed progress is kept; the returned summary is marked
    /// interrupted. Fatal crawl errors are returned unchanged.
    pub async fn run_until_ctrl_c(&self) -> Result<CrawlSummary> {
        let crawl = self.crawler.run();
        tokio::pin!(crawl);

        let interrupt = tokio::select! {
            result = &mut crawl => return result,
            signal_result = signal::ctrl_c() => match signal_result {
                Ok(()) => Interrupt::CtrlC,
                Err(err) => Interrupt::SignalUnavailable(err),
            },
        };

        match interrupt {
            Interrupt::CtrlC => {
                tracing::info!("Ctrl-C received; cancelling crawl");
                self.shutdown.cancel();
            }
            Interrupt::SignalUnavailable(err) => {
                tracing::warn!(error = %err, "failed to listen for Ctrl-C; crawling without signal handling");
            }
        }

        crawl.await
    }
}
