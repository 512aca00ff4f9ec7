use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, wait_for_cursor, ADDRESS},
    mock_chain::{MockChain, MockChainServer},
};
use anyhow::{Context, Result};
use blockcrawl::fetch::VersionedFetchers;
use blockcrawl::rpc::{LogFetcher, NodeRpcClient};
use blockcrawl::{CrawlConfig, Crawler, MemoryStore, Runner};
use tokio::time::timeout;

fn log_crawler(
    server: &MockChainServer,
    config: CrawlConfig,
    store: Arc<MemoryStore>,
) -> Result<Crawler> {
    let client = NodeRpcClient::new(server.rpc_url())?;
    let fetcher = LogFetcher::new(client.clone(), [ADDRESS])?;
    Ok(Crawler::new(config, VersionedFetchers::single(Arc::new(fetcher)), store)?
        .with_chain_head(Arc::new(client)))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_returns_fatal_crawl_errors() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(400);
    chain.add_log(ADDRESS, 110, 0);
    chain.poison_block(230);
    let server = MockChainServer::start(chain.clone()).await?;

    let config = CrawlConfig::builder()
        .from_block(100)
        .confirmations(0)
        .span_blocks(100)
        .max_blocks(50)
        .attempts(2)
        .retry_delay(Duration::from_millis(5))
        .build()?;
    let store = Arc::new(MemoryStore::new());
    let runner = Runner::new(log_crawler(&server, config, store.clone())?);

    let outcome = timeout(Duration::from_secs(10), runner.run_until_ctrl_c())
        .await
        .context("runner should stop after the job failure")?;

    let err = outcome.expect_err("poisoned range must abort the runner");
    let message = format!("{err:#}");
    assert!(
        message.contains("failed to crawl span [200, 300)"),
        "runner did not propagate the failure, got {message}"
    );
    assert!(!runner.cancellation_token().is_cancelled());
    assert_eq!(store.records().len(), 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_token_interrupts_follow_mode() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(250);
    chain.add_log(ADDRESS, 140, 0);
    let server = MockChainServer::start(chain.clone()).await?;

    let config = CrawlConfig::builder()
        .from_block(100)
        .confirmations(7)
        .span_blocks(100)
        .max_blocks(25)
        .follow_interval(Duration::from_millis(20))
        .build()?;
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(Runner::new(log_crawler(&server, config, store.clone())?));
    let shutdown = runner.cancellation_token();

    let task_runner = runner.clone();
    let handle = tokio::spawn(async move { task_runner.run().await });

    wait_for_cursor(&store, 242, Duration::from_secs(10)).await?;
    shutdown.cancel();

    let summary = timeout(Duration::from_secs(5), handle)
        .await
        .context("runner should stop after cancellation")???;

    assert!(summary.interrupted);
    assert_eq!(summary.start_block, 100);
    assert_eq!(summary.last_committed_block, Some(242));
    assert_eq!(summary.records, 1);

    server.shutdown().await;
    Ok(())
}
