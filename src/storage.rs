//! Persistence seams of the crawler. A [`CommitSink`] receives each job's
//! records in block order; a [`CursorStore`] reports where a previous run
//! stopped; a [`ChainHead`] reports the newest block a source knows about.

pub mod memory;

pub use memory::{CommittedBatch, MemoryStore};

use crate::planner::BlockRange;
use crate::records::Record;
use anyhow::Result;
use futures::future::BoxFuture;

pub trait CommitSink: Send + Sync {
    /// Persists the records of `range`. Called once per job, strictly in
    /// ascending block order, never concurrently. An empty `records` still
    /// marks `range` as crawled.
    fn commit<'a>(&'a self, range: BlockRange, records: Vec<Record>) -> BoxFuture<'a, Result<()>>;
}

pub trait CursorStore: Send + Sync {
    /// Last block fully committed by an earlier run, if any.
    fn last_committed_block<'a>(&'a self) -> BoxFuture<'a, Result<Option<u64>>>;
}

pub trait ChainHead: Send + Sync {
    fn latest_block<'a>(&'a self) -> BoxFuture<'a, Result<u64>>;
}
