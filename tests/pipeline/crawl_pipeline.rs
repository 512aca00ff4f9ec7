use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{
        assert_ordered_batches, init_tracing, wait_for_cursor, RecordingSink, ADDRESS,
        OTHER_ADDRESS, TOKEN,
    },
    mock_chain::{MockChain, MockChainServer},
};
use anyhow::{Context, Result};
use blockcrawl::explorer::{ExplorerClient, ExplorerClientOptions, ExplorerFetcher, TransactionKind};
use blockcrawl::fetch::{FetchCapability, VersionedFetchers};
use blockcrawl::pool::PoolError;
use blockcrawl::rpc::{LogFetcher, NodeRpcClient};
use blockcrawl::tokens::TokenInfoCache;
use blockcrawl::{CrawlConfig, Crawler, MemoryStore, Record, RecordKind, Telemetry};
use tokio::time::timeout;

const CRAWL_TIMEOUT: Duration = Duration::from_secs(10);

fn explorer_fetcher(
    server: &MockChainServer,
    addresses: &[&str],
    config: &CrawlConfig,
    telemetry: Option<Arc<Telemetry>>,
) -> Result<Arc<dyn FetchCapability>> {
    let mut client = ExplorerClient::new(ExplorerClientOptions {
        base_url: server.explorer_url(),
        api_key: Some("test-key".to_string()),
        ..ExplorerClientOptions::default()
    })?;
    if let Some(telemetry) = telemetry {
        client = client.with_telemetry(telemetry);
    }
    let fetcher = ExplorerFetcher::from_config(client, addresses, &TransactionKind::ALL, config)?;
    Ok(Arc::new(fetcher))
}

fn log_fetcher(server: &MockChainServer, addresses: &[&str]) -> Result<Arc<dyn FetchCapability>> {
    let client = NodeRpcClient::new(server.rpc_url())?;
    Ok(Arc::new(LogFetcher::new(client, addresses)?))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn explorer_crawl_commits_every_listing_in_block_order() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(1_000);
    for block in [105, 110, 150, 151, 152, 260, 399] {
        chain.add_normal_tx(ADDRESS, block);
    }
    chain.add_internal_tx(ADDRESS, 110);
    chain.add_internal_tx(ADDRESS, 300);
    chain.add_token_transfer(ADDRESS, 120, TOKEN);
    chain.add_token_transfer(ADDRESS, 250, TOKEN);
    chain.add_normal_tx(OTHER_ADDRESS, 200);
    chain.add_normal_tx(OTHER_ADDRESS, 201);
    chain.add_normal_tx(ADDRESS, 400);
    let server = MockChainServer::start(chain.clone()).await?;

    let config = CrawlConfig::builder()
        .from_block(100)
        .to_block(400)
        .span_blocks(100)
        .max_blocks(25)
        .max_workers(4)
        .attempts(3)
        .retry_delay(Duration::from_millis(10))
        .page_size(2)
        .build()?;
    let store = Arc::new(MemoryStore::new());
    let fetcher = explorer_fetcher(&server, &[ADDRESS, OTHER_ADDRESS], &config, None)?;
    let crawler = Crawler::new(config, VersionedFetchers::single(fetcher), store.clone())?;

    let summary = timeout(CRAWL_TIMEOUT, crawler.run())
        .await
        .context("crawl should finish")??;

    assert!(!summary.interrupted);
    assert_eq!(summary.spans, 3);
    assert_eq!(summary.jobs, 12);
    assert_eq!(summary.records, 13);
    assert_eq!(summary.last_committed_block, Some(399));
    assert_eq!(store.cursor(), Some(399));
    assert_ordered_batches(&store);

    let first = &store.batches()[0];
    assert_eq!(first.range.from_block(), 100);
    let kinds: Vec<RecordKind> = first.records.iter().map(Record::kind).collect();
    assert_eq!(
        kinds,
        vec![
            RecordKind::NormalTx,
            RecordKind::NormalTx,
            RecordKind::InternalTx,
            RecordKind::TokenTransfer
        ]
    );
    assert!(
        store.records().iter().all(|record| record.block_number() < 400),
        "the end block is exclusive"
    );
    let offsets = chain.explorer_offsets();
    assert!(!offsets.is_empty());
    assert!(
        offsets.iter().all(|offset| *offset == 2),
        "configured page size must reach every request: {offsets:?}"
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transient_explorer_failures_are_retried() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(1_000);
    for block in [101, 140, 199] {
        chain.add_normal_tx(ADDRESS, block);
    }
    chain.fail_next_requests(3);
    let server = MockChainServer::start(chain.clone()).await?;

    let telemetry = Arc::new(Telemetry::default());
    let config = CrawlConfig::builder()
        .from_block(100)
        .to_block(200)
        .span_blocks(100)
        .max_blocks(50)
        .max_workers(2)
        .attempts(5)
        .retry_delay(Duration::from_millis(10))
        .build()?;
    let store = Arc::new(MemoryStore::new());
    let fetcher = explorer_fetcher(&server, &[ADDRESS], &config, Some(telemetry.clone()))?;
    let crawler = Crawler::new(config, VersionedFetchers::single(fetcher), store.clone())?
        .with_telemetry(telemetry.clone());

    let summary = timeout(CRAWL_TIMEOUT, crawler.run())
        .await
        .context("crawl should finish")??;

    assert_eq!(summary.records, 3);
    let snapshot = telemetry.snapshot();
    assert_eq!(snapshot.failed_attempts, 3);
    assert_eq!(snapshot.failed_jobs, 0);
    assert_eq!(snapshot.rpc_errors, 3);
    assert_ordered_batches(&store);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn permanent_source_failure_aborts_the_crawl() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(1_000);
    for block in [120, 210, 260, 280] {
        chain.add_normal_tx(ADDRESS, block);
    }
    chain.poison_block(250);
    let server = MockChainServer::start(chain.clone()).await?;

    let config = CrawlConfig::builder()
        .from_block(100)
        .to_block(400)
        .span_blocks(100)
        .max_blocks(25)
        .max_workers(4)
        .attempts(2)
        .retry_delay(Duration::from_millis(5))
        .build()?;
    let store = Arc::new(MemoryStore::new());
    let fetcher = explorer_fetcher(&server, &[ADDRESS], &config, None)?;
    let crawler = Crawler::new(config, VersionedFetchers::single(fetcher), store.clone())?;

    let err = timeout(CRAWL_TIMEOUT, crawler.run())
        .await
        .context("crawl should stop")?
        .expect_err("poisoned block must fail the crawl");

    assert!(
        matches!(
            err.downcast_ref::<PoolError>(),
            Some(PoolError::JobFailed { order: 3, .. })
        ),
        "unexpected error: {err:#}"
    );
    assert!(format!("{err:#}").contains("failed to crawl span [200, 300)"));
    assert!(!crawler.shutdown_token().is_cancelled());

    let cursor = store.cursor().expect("first span must be committed");
    assert!((199..250).contains(&cursor), "cursor {cursor} passed the failed job");
    assert!(store.records().iter().all(|record| record.block_number() < 250));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_commit_stops_before_later_ranges() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(1_000);
    let server = MockChainServer::start(chain.clone()).await?;

    let config = CrawlConfig::builder()
        .from_block(100)
        .to_block(300)
        .span_blocks(100)
        .max_blocks(25)
        .max_workers(4)
        .build()?;
    let sink = RecordingSink::failing_at(150);
    let fetcher = explorer_fetcher(&server, &[ADDRESS], &config, None)?;
    let crawler = Crawler::new(
        config,
        VersionedFetchers::single(fetcher),
        Arc::new(sink.clone()),
    )?;

    let err = timeout(CRAWL_TIMEOUT, crawler.run())
        .await
        .context("crawl should stop")?
        .expect_err("commit failure must fail the crawl");

    assert!(
        matches!(
            err.downcast_ref::<PoolError>(),
            Some(PoolError::CommitFailed { order: 3, .. })
        ),
        "unexpected error: {err:#}"
    );
    let ranges = sink.ranges();
    assert_eq!(ranges.len(), 2, "only the first two empty ranges commit");
    assert_eq!(ranges[0].from_block(), 100);
    sink.assert_contiguous();

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn log_crawl_follows_the_chain_head() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(300);
    chain.add_log(ADDRESS, 120, 0);
    chain.add_log(ADDRESS, 120, 1);
    chain.add_log(OTHER_ADDRESS, 130, 0);
    chain.add_log(ADDRESS, 250, 4);
    chain.add_log(ADDRESS, 450, 2);
    let server = MockChainServer::start(chain.clone()).await?;

    let config = CrawlConfig::builder()
        .from_block(100)
        .confirmations(0)
        .span_blocks(100)
        .max_blocks(50)
        .max_workers(2)
        .follow_interval(Duration::from_millis(50))
        .build()?;
    let store = Arc::new(MemoryStore::new());
    let head = Arc::new(NodeRpcClient::new(server.rpc_url())?);
    let crawler = Crawler::new(
        config,
        VersionedFetchers::single(log_fetcher(&server, &[ADDRESS])?),
        store.clone(),
    )?
    .with_chain_head(head);
    let shutdown = crawler.shutdown_token();

    let handle = tokio::spawn(async move { crawler.run().await });

    wait_for_cursor(&store, 299, CRAWL_TIMEOUT).await?;
    chain.set_head(500);
    wait_for_cursor(&store, 499, CRAWL_TIMEOUT).await?;
    shutdown.cancel();

    let summary = timeout(CRAWL_TIMEOUT, handle)
        .await
        .context("crawl should stop after cancellation")???;

    assert!(summary.interrupted);
    assert_eq!(summary.end_block, 500);
    assert_eq!(summary.last_committed_block, Some(499));
    let blocks: Vec<u64> = store.records().iter().map(Record::block_number).collect();
    assert_eq!(blocks, vec![120, 120, 250, 450]);
    assert_ordered_batches(&store);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crawl_resumes_after_the_stored_cursor() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(1_000);
    chain.add_normal_tx(ADDRESS, 150);
    chain.add_normal_tx(ADDRESS, 220);
    let server = MockChainServer::start(chain.clone()).await?;

    let config = CrawlConfig::builder()
        .to_block(300)
        .span_blocks(100)
        .max_blocks(50)
        .build()?;
    let store = Arc::new(MemoryStore::with_cursor(199));
    let fetcher = explorer_fetcher(&server, &[ADDRESS], &config, None)?;
    let crawler = Crawler::new(config, VersionedFetchers::single(fetcher), store.clone())?
        .with_cursor_store(store.clone());

    let summary = timeout(CRAWL_TIMEOUT, crawler.run())
        .await
        .context("crawl should finish")??;

    assert_eq!(summary.start_block, 200);
    let blocks: Vec<u64> = store.records().iter().map(Record::block_number).collect();
    assert_eq!(blocks, vec![220]);
    assert_eq!(store.cursor(), Some(299));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn version_boundary_switches_data_source() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(1_000);
    chain.add_normal_tx(ADDRESS, 150);
    chain.add_normal_tx(ADDRESS, 250);
    chain.add_log(ADDRESS, 180, 0);
    chain.add_log(ADDRESS, 260, 0);
    let server = MockChainServer::start(chain.clone()).await?;

    let config = CrawlConfig::builder()
        .from_block(100)
        .to_block(300)
        .span_blocks(300)
        .max_blocks(40)
        .version_boundary(200)
        .build()?;
    let fetchers = VersionedFetchers::per_version(
        vec![
            explorer_fetcher(&server, &[ADDRESS], &config, None)?,
            log_fetcher(&server, &[ADDRESS])?,
        ],
        config.version_boundaries(),
    )?;
    let store = Arc::new(MemoryStore::new());
    let crawler = Crawler::new(config, fetchers, store.clone())?;

    timeout(CRAWL_TIMEOUT, crawler.run())
        .await
        .context("crawl should finish")??;

    let records: Vec<(RecordKind, u64)> = store
        .records()
        .iter()
        .map(|record| (record.kind(), record.block_number()))
        .collect();
    assert_eq!(
        records,
        vec![(RecordKind::NormalTx, 150), (RecordKind::EventLog, 260)]
    );
    assert!(store
        .batches()
        .iter()
        .all(|batch| batch.range.to_block() <= 200 || batch.range.from_block() >= 200));

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn token_metadata_is_resolved_once_per_address() -> Result<()> {
    let chain = MockChain::new(1_000);
    chain.add_token(TOKEN, "knc", "Kyber Network Crystal");
    let server = MockChainServer::start(chain.clone()).await?;

    let cache = TokenInfoCache::new(NodeRpcClient::new(server.rpc_url())?);
    assert_eq!(cache.symbol(TOKEN).await?, "KNC");
    assert_eq!(cache.symbol(&TOKEN.to_ascii_uppercase().replace("0X", "0x")).await?, "KNC");
    assert_eq!(chain.rpc_requests(), 1);
    assert_eq!(cache.name(TOKEN).await?, "Kyber Network Crystal");
    assert!(cache
        .symbol("0x0000000000000000000000000000000000000009")
        .await
        .is_err());

    server.shutdown().await;
    Ok(())
}
