use super::range::BlockRange;

/// Yields contiguous spans of at most `span_blocks` blocks covering
/// `[start, end)`. The final span may be shorter.
#[derive(Debug, Clone)]
pub struct CrawlPlanner {
    cursor: u64,
    end: u64,
    span_blocks: u64,
}

impl CrawlPlanner {
    pub fn new(start: u64, end: u64, span_blocks: u64) -> Self {
        Self {
            cursor: start,
            end,
            span_blocks: span_blocks.max(1),
        }
    }

    /// First block not yet handed out.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.end
    }

    /// Moves the exclusive end forward. A smaller end is ignored so the
    /// planner never hands out a range twice.
    pub fn extend_to(&mut self, end: u64) {
        if end > self.end {
            self.end = end;
        }
    }

    pub fn next_span(&mut self) -> Option<BlockRange> {
        if self.is_exhausted() {
            return None;
        }
        let to = self.cursor.saturating_add(self.span_blocks).min(self.end);
        let span = BlockRange::new(self.cursor, to).ok()?;
        self.cursor = to;
        Some(span)
    }
}

impl Iterator for CrawlPlanner {
    type Item = BlockRange;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_span()
    }
}

/// Number of workers a span needs: one per `max_blocks` chunk of the
/// inclusive `[from_block, to_block]` width, capped at `max_workers`.
pub fn required_workers(from_block: u64, to_block: u64, max_blocks: u64, max_workers: usize) -> usize {
    if to_block < from_block || max_blocks == 0 {
        return 0;
    }
    let width = to_block - from_block + 1;
    let jobs = width.div_ceil(max_blocks);
    usize::try_from(jobs).map_or(max_workers, |jobs| jobs.min(max_workers))
}
