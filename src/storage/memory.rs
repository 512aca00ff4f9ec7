use crate::planner::BlockRange;
use crate::records::Record;
use crate::storage::{CommitSink, CursorStore};
use anyhow::Result;
use futures::future::BoxFuture;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBatch {
    pub range: BlockRange,
    pub records: Vec<Record>,
}

#[derive(Debug, Default)]
struct MemoryState {
    batches: Vec<CommittedBatch>,
    cursor: Option<u64>,
}

/// Sink and cursor kept in process memory. Useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that behaves as if an earlier run committed up to `block`.
    pub fn with_cursor(block: u64) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                batches: Vec::new(),
                cursor: Some(block),
            }),
        }
    }

    pub fn batches(&self) -> Vec<CommittedBatch> {
        self.state().batches.clone()
    }

    pub fn records(&self) -> Vec<Record> {
        self.state()
            .batches
            .iter()
            .flat_map(|batch| batch.records.iter().cloned())
            .collect()
    }

    pub fn cursor(&self) -> Option<u64> {
        self.state().cursor
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CommitSink for MemoryStore {
    fn commit<'a>(&'a self, range: BlockRange, records: Vec<Record>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state();
            if !records.is_empty() {
                state.batches.push(CommittedBatch { range, records });
            }
            state.cursor = Some(range.last_block());
            Ok(())
        })
    }
}

impl CursorStore for MemoryStore {
    fn last_committed_block<'a>(&'a self) -> BoxFuture<'a, Result<Option<u64>>> {
        Box::pin(async move { Ok(self.cursor()) })
    }
}
