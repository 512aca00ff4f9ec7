pub mod explorer;
pub mod fetch;
pub mod orchestrator;
pub mod planner;
pub mod pool;
pub mod records;
pub mod rpc;
pub mod runtime;
pub mod storage;
pub mod tokens;

pub use explorer::{ExplorerClient, ExplorerClientOptions, ExplorerFetcher, TransactionKind};
pub use fetch::{
    FetchCapability, FetchError, FetcherJob, PageSource, PaginatedFetcher, VersionedFetchers,
};
pub use orchestrator::{CrawlSummary, Crawler};
pub use planner::{BlockRange, CrawlPlanner, VersionBoundaries};
pub use pool::{CommitGate, PoolError, WorkerPool};
pub use records::{CanonicalRecord, Record, RecordKind, ToCanonical};
pub use rpc::{BasicAuth, LogFetcher, NodeRpcClient, RpcClientOptions, RpcError};
pub use runtime::config::{CrawlConfig, CrawlConfigBuilder, CrawlConfigParams};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use storage::{ChainHead, CommitSink, CursorStore, MemoryStore};
pub use tokens::{TokenInfoCache, TokenResolver};
