use std::env;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use blockcrawl::explorer::{ExplorerClient, ExplorerClientOptions, ExplorerFetcher, TransactionKind};
use blockcrawl::fetch::{FetchCapability, VersionedFetchers};
use blockcrawl::runtime::progress::CrawlProgress;
use blockcrawl::{
    BlockRange, CommitSink, CrawlConfig, Crawler, NodeRpcClient, Record, RecordKind, Runner,
    Telemetry,
};
use futures::future::BoxFuture;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::task::JoinHandle;
use tokio::time::sleep;

const DEFAULT_EXPLORER_URL: &str = blockcrawl::explorer::DEFAULT_EXPLORER_URL;
const DEFAULT_RPC_URL: &str = "http://localhost:8545";
const DEFAULT_KINDS: &str = "normal,internal,transfer";
const DEFAULT_LOG_DIRECTIVE: &str = "warn";
const DEFAULT_MAX_WORKERS: usize = 5;
const DEFAULT_MAX_BLOCKS: u64 = 100;
const DEFAULT_SPAN_BLOCKS: u64 = 10_000;

#[tokio::main]
async fn main() -> Result<()> {
    init_example_tracing();

    let args = ExampleArgs::from_env()?;
    let bar = build_progress_bar();
    bar.println(format!(
        "Crawling {} address(es) with up to {} workers",
        args.addresses.len(),
        args.max_workers
    ));

    let telemetry = Arc::new(Telemetry::default());
    let explorer = ExplorerClient::new(ExplorerClientOptions {
        base_url: args.explorer_url.clone(),
        api_key: args.api_key.clone(),
        ..ExplorerClientOptions::default()
    })?
    .with_telemetry(telemetry.clone());
    let config = args.to_crawl_config()?;
    let fetcher: Arc<dyn FetchCapability> = Arc::new(ExplorerFetcher::from_config(
        explorer,
        &args.addresses,
        &args.kinds,
        &config,
    )?);
    let node = NodeRpcClient::new(args.rpc_url.clone())?.with_telemetry(telemetry.clone());

    let sink = Arc::new(CountingSink::new(bar.clone()));
    let crawler = Crawler::new(
        config,
        VersionedFetchers::single(fetcher),
        sink.clone(),
    )?
    .with_chain_head(Arc::new(node))
    .with_telemetry(telemetry);

    let runner = Runner::new(crawler);
    let bar_handle = spawn_bar_refresh(runner.crawler().progress(), bar.clone());
    let run_result = runner.run_until_ctrl_c().await;
    bar_handle.abort();

    match run_result {
        Ok(summary) => {
            let message = if summary.interrupted {
                "stopped by Ctrl-C"
            } else {
                "crawl finished"
            };
            bar.finish_with_message(message);
            bar.println(format!(
                "Committed {} records in {} jobs ({} -> {:?}); {} normal, {} internal, {} transfers",
                summary.records,
                summary.jobs,
                summary.start_block,
                summary.last_committed_block,
                sink.count(RecordKind::NormalTx),
                sink.count(RecordKind::InternalTx),
                sink.count(RecordKind::TokenTransfer),
            ));
            Ok(())
        }
        Err(err) => {
            bar.finish_with_message("crawl aborted");
            Err(err)
        }
    }
}

fn init_example_tracing() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", DEFAULT_LOG_DIRECTIVE);
    }
    blockcrawl::init_tracing();
}

fn build_progress_bar() -> ProgressBar {
    let bar = ProgressBar::with_draw_target(Some(1), ProgressDrawTarget::stdout_with_hz(12));
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} blocks ({per_sec:.2} blk/s) {msg}",
    )
    .expect("valid progress bar template")
    .progress_chars("=>-");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn spawn_bar_refresh(progress: Arc<CrawlProgress>, bar: ProgressBar) -> JoinHandle<()> {
    const REFRESH_INTERVAL_MS: u64 = 250;
    tokio::spawn(async move {
        loop {
            if let (Some(remaining), Some(last)) =
                (progress.remaining_blocks(), progress.last_committed())
            {
                let done = bar.position();
                bar.set_length(done.saturating_add(remaining).max(1));
                bar.set_message(format!("block {last}"));
            }
            sleep(Duration::from_millis(REFRESH_INTERVAL_MS)).await;
        }
    })
}

/// Counts committed records per kind and advances the progress bar by the
/// width of every committed range.
struct CountingSink {
    bar: ProgressBar,
    normal: AtomicU64,
    internal: AtomicU64,
    transfers: AtomicU64,
    logs: AtomicU64,
}

impl CountingSink {
    fn new(bar: ProgressBar) -> Self {
        Self {
            bar,
            normal: AtomicU64::new(0),
            internal: AtomicU64::new(0),
            transfers: AtomicU64::new(0),
            logs: AtomicU64::new(0),
        }
    }

    fn counter(&self, kind: RecordKind) -> &AtomicU64 {
        match kind {
            RecordKind::NormalTx => &self.normal,
            RecordKind::InternalTx => &self.internal,
            RecordKind::TokenTransfer => &self.transfers,
            RecordKind::EventLog => &self.logs,
        }
    }

    fn count(&self, kind: RecordKind) -> u64 {
        self.counter(kind).load(Ordering::Relaxed)
    }
}

impl CommitSink for CountingSink {
    fn commit<'a>(&'a self, range: BlockRange, records: Vec<Record>) -> BoxFuture<'a, Result<()>> {
        for record in &records {
            self.counter(record.kind()).fetch_add(1, Ordering::Relaxed);
        }
        self.bar.inc(range.len());
        Box::pin(async { Ok(()) })
    }
}

struct ExampleArgs {
    explorer_url: String,
    api_key: Option<String>,
    rpc_url: String,
    addresses: Vec<String>,
    kinds: Vec<TransactionKind>,
    from_block: Option<u64>,
    to_block: Option<u64>,
    max_workers: usize,
    max_blocks: u64,
    span_blocks: u64,
    page_size: Option<usize>,
    follow_secs: Option<u64>,
}

impl ExampleArgs {
    fn from_env() -> Result<Self> {
        let explorer_url = read_env_or_default("BLOCKCRAWL_EXPLORER_URL", DEFAULT_EXPLORER_URL);
        let api_key = env::var("BLOCKCRAWL_API_KEY")
            .ok()
            .filter(|value| !value.trim().is_empty());
        let rpc_url = read_env_or_default("BLOCKCRAWL_RPC_URL", DEFAULT_RPC_URL);
        let addresses: Vec<String> = read_env_or_default("BLOCKCRAWL_ADDRESSES", "")
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();
        let kinds = read_env_or_default("BLOCKCRAWL_KINDS", DEFAULT_KINDS)
            .split(',')
            .filter(|value| !value.trim().is_empty())
            .map(TransactionKind::from_str)
            .collect::<Result<Vec<_>>>()?;
        let from_block = parse_optional_env::<u64>("BLOCKCRAWL_FROM_BLOCK")?;
        let to_block = parse_optional_env::<u64>("BLOCKCRAWL_TO_BLOCK")?;
        let max_workers =
            parse_env_with_default::<usize>("BLOCKCRAWL_MAX_WORKERS", DEFAULT_MAX_WORKERS)?;
        let max_blocks = parse_env_with_default::<u64>("BLOCKCRAWL_MAX_BLOCKS", DEFAULT_MAX_BLOCKS)?;
        let span_blocks =
            parse_env_with_default::<u64>("BLOCKCRAWL_SPAN_BLOCKS", DEFAULT_SPAN_BLOCKS)?;
        let page_size = parse_optional_env::<usize>("BLOCKCRAWL_PAGE_SIZE")?;
        let follow_secs = parse_optional_env::<u64>("BLOCKCRAWL_FOLLOW_SECS")?;

        ensure!(
            !addresses.is_empty(),
            "BLOCKCRAWL_ADDRESSES must list at least one address"
        );
        ensure!(!kinds.is_empty(), "BLOCKCRAWL_KINDS must not be empty");

        Ok(Self {
            explorer_url,
            api_key,
            rpc_url,
            addresses,
            kinds,
            from_block,
            to_block,
            max_workers,
            max_blocks,
            span_blocks,
            page_size,
            follow_secs,
        })
    }

    fn to_crawl_config(&self) -> Result<CrawlConfig> {
        let mut builder = CrawlConfig::builder()
            .max_workers(self.max_workers)
            .max_blocks(self.max_blocks)
            .span_blocks(self.span_blocks);
        if let Some(size) = self.page_size {
            builder = builder.page_size(size);
        }
        if let Some(block) = self.from_block {
            builder = builder.from_block(block);
        }
        if let Some(block) = self.to_block {
            builder = builder.to_block(block);
        }
        if let Some(secs) = self.follow_secs {
            builder = builder.follow_interval(Duration::from_secs(secs));
        }
        builder.build()
    }
}

fn read_env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn parse_env_with_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(parse_optional_env(key)?.unwrap_or(default))
}

fn parse_optional_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("failed to parse {key}='{value}'")),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {key}")),
    }
}
