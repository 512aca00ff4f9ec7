use crate::fetch::paginated::DEFAULT_PAGE_SIZE;
use crate::planner::VersionBoundaries;
use crate::runtime::telemetry;
use anyhow::{bail, Result};
use std::time::Duration;

/// First block crawled when neither a start block nor a stored cursor exists.
pub const DEFAULT_FROM_BLOCK: u64 = 5_069_586;
pub const DEFAULT_CONFIRMATIONS: u64 = 7;
pub const DEFAULT_SPAN_BLOCKS: u64 = 10_000;
pub const DEFAULT_MAX_BLOCKS: u64 = 100;
pub const DEFAULT_MAX_WORKERS: usize = 5;
pub const DEFAULT_ATTEMPTS: usize = 5;
const DEFAULT_RETRY_DELAY_SECS: u64 = 1;
const MAX_SOURCE_BLOCK: u64 = i64::MAX as u64;

/// Runtime configuration for a crawl.
///
/// All instances must be constructed via [`CrawlConfig::builder`] or [`CrawlConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    from_block: Option<u64>,
    to_block: Option<u64>,
    confirmations: u64,
    span_blocks: u64,
    max_blocks: u64,
    max_workers: usize,
    attempts: usize,
    retry_delay: Duration,
    page_size: usize,
    version_boundaries: VersionBoundaries,
    metrics_interval: Duration,
    follow_interval: Option<Duration>,
}

pub struct CrawlConfigParams {
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    pub confirmations: u64,
    pub span_blocks: u64,
    pub max_blocks: u64,
    pub max_workers: usize,
    pub attempts: usize,
    pub retry_delay: Duration,
    pub page_size: usize,
    pub version_boundaries: Vec<u64>,
    pub metrics_interval: Duration,
    pub follow_interval: Option<Duration>,
}

impl CrawlConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> CrawlConfigBuilder {
        CrawlConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: CrawlConfigParams) -> Result<Self> {
        let CrawlConfigParams {
            from_block,
            to_block,
            confirmations,
            span_blocks,
            max_blocks,
            max_workers,
            attempts,
            retry_delay,
            page_size,
            version_boundaries,
            metrics_interval,
            follow_interval,
        } = params;

        let config = Self {
            from_block,
            to_block,
            confirmations,
            span_blocks,
            max_blocks,
            max_workers,
            attempts,
            retry_delay,
            page_size,
            version_boundaries: VersionBoundaries::new(version_boundaries),
            metrics_interval,
            follow_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// First block to crawl; `None` resumes from the stored cursor.
    pub fn from_block(&self) -> Option<u64> {
        self.from_block
    }

    /// Exclusive end of the crawl; `None` tracks the chain head.
    pub fn to_block(&self) -> Option<u64> {
        self.to_block
    }

    /// Blocks below the head treated as not yet final.
    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    /// Width of one planner span; each span gets its own worker pool.
    pub fn span_blocks(&self) -> u64 {
        self.span_blocks
    }

    /// Maximum width of one fetcher job.
    pub fn max_blocks(&self) -> u64 {
        self.max_blocks
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Fetch attempts per job, including the first.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn version_boundaries(&self) -> &VersionBoundaries {
        &self.version_boundaries
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Poll interval for new blocks once the crawl catches up with the head.
    pub fn follow_interval(&self) -> Option<Duration> {
        self.follow_interval
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.span_blocks == 0 {
            bail!("span_blocks must be greater than 0");
        }

        if self.max_blocks == 0 {
            bail!("max_blocks must be greater than 0");
        }

        if self.max_workers == 0 {
            bail!("max_workers must be greater than 0");
        }

        if self.attempts == 0 {
            bail!("attempts must be greater than 0");
        }

        if self.retry_delay.is_zero() {
            bail!("retry_delay must be greater than 0");
        }

        if self.page_size == 0 {
            bail!("page_size must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        for (field, value) in [("from_block", self.from_block), ("to_block", self.to_block)] {
            if let Some(block) = value {
                if block > MAX_SOURCE_BLOCK {
                    bail!("{field} ({block}) exceeds the largest supported block {MAX_SOURCE_BLOCK}");
                }
            }
        }

        if let Some(interval) = self.follow_interval {
            if interval.is_zero() {
                bail!("follow_interval must be greater than 0");
            }
            if self.to_block.is_some() {
                bail!("follow_interval cannot be combined with a fixed to_block");
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct CrawlConfigBuilder {
    from_block: Option<u64>,
    to_block: Option<u64>,
    confirmations: Option<u64>,
    span_blocks: Option<u64>,
    max_blocks: Option<u64>,
    max_workers: Option<usize>,
    attempts: Option<usize>,
    retry_delay: Option<Duration>,
    page_size: Option<usize>,
    version_boundaries: Vec<u64>,
    metrics_interval: Option<Duration>,
    follow_interval: Option<Duration>,
}

impl CrawlConfigBuilder {
    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }

    pub fn to_block(mut self, block: u64) -> Self {
        self.to_block = Some(block);
        self
    }

    pub fn confirmations(mut self, blocks: u64) -> Self {
        self.confirmations = Some(blocks);
        self
    }

    pub fn span_blocks(mut self, blocks: u64) -> Self {
        self.span_blocks = Some(blocks);
        self
    }

    pub fn max_blocks(mut self, blocks: u64) -> Self {
        self.max_blocks = Some(blocks);
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    pub fn attempts(mut self, attempts: usize) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn version_boundary(mut self, block: u64) -> Self {
        self.version_boundaries.push(block);
        self
    }

    pub fn version_boundaries(mut self, blocks: impl IntoIterator<Item = u64>) -> Self {
        self.version_boundaries.extend(blocks);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn follow_interval(mut self, interval: Duration) -> Self {
        self.follow_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<CrawlConfig> {
        let params = CrawlConfigParams {
            from_block: self.from_block,
            to_block: self.to_block,
            confirmations: self.confirmations.unwrap_or(DEFAULT_CONFIRMATIONS),
            span_blocks: self.span_blocks.unwrap_or(DEFAULT_SPAN_BLOCKS),
            max_blocks: self.max_blocks.unwrap_or(DEFAULT_MAX_BLOCKS),
            max_workers: self.max_workers.unwrap_or(DEFAULT_MAX_WORKERS),
            attempts: self.attempts.unwrap_or(DEFAULT_ATTEMPTS),
            retry_delay: self
                .retry_delay
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RETRY_DELAY_SECS)),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            version_boundaries: self.version_boundaries,
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            follow_interval: self.follow_interval,
        };

        CrawlConfig::new(params)
    }
}
