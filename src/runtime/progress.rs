use std::sync::atomic::{AtomicU64, Ordering};

const UNSET: u64 = u64::MAX;

/// In-memory view of how far the crawl has committed and where it is heading.
#[derive(Debug)]
pub struct CrawlProgress {
    last_committed: AtomicU64,
    target_end: AtomicU64,
}

impl Default for CrawlProgress {
    fn default() -> Self {
        Self {
            last_committed: AtomicU64::new(UNSET),
            target_end: AtomicU64::new(UNSET),
        }
    }
}

impl CrawlProgress {
    pub fn new(start_block: u64) -> Self {
        let progress = Self::default();
        progress.reset(start_block);
        progress
    }

    pub fn reset(&self, start_block: u64) {
        self.last_committed
            .store(Self::initial_value(start_block), Ordering::SeqCst);
    }

    /// Commits arrive in block order, so the stored value only moves forward.
    pub fn mark_committed(&self, last_block: u64) {
        let _ = self
            .last_committed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current == UNSET || last_block > current {
                    Some(last_block)
                } else {
                    None
                }
            });
    }

    pub fn last_committed(&self) -> Option<u64> {
        match self.last_committed.load(Ordering::SeqCst) {
            UNSET => None,
            value => Some(value),
        }
    }

    /// Records the exclusive end block the crawl is currently heading for.
    pub fn set_target(&self, end_block: u64) {
        self.target_end.store(end_block, Ordering::SeqCst);
    }

    pub fn target(&self) -> Option<u64> {
        match self.target_end.load(Ordering::SeqCst) {
            UNSET => None,
            value => Some(value),
        }
    }

    /// Blocks left before the current target, if one is known.
    pub fn remaining_blocks(&self) -> Option<u64> {
        let target = self.target()?;
        let next = self.last_committed().map_or(0, |block| block + 1);
        Some(target.saturating_sub(next))
    }

    fn initial_value(start_block: u64) -> u64 {
        if start_block == 0 {
            UNSET
        } else {
            start_block - 1
        }
    }
}
