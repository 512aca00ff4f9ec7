use super::range::BlockRange;

/// Sorted, deduplicated block numbers at which the data source schema
/// changes. Version `i` covers blocks from boundary `i - 1` (inclusive) up to
/// boundary `i` (exclusive); version 0 starts at genesis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionBoundaries(Vec<u64>);

impl VersionBoundaries {
    pub fn new(boundaries: impl IntoIterator<Item = u64>) -> Self {
        let mut boundaries: Vec<u64> = boundaries.into_iter().collect();
        boundaries.sort_unstable();
        boundaries.dedup();
        Self(boundaries)
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct versions the boundaries describe.
    pub fn version_count(&self) -> usize {
        self.0.len() + 1
    }

    pub fn version_at(&self, block: u64) -> usize {
        self.0.partition_point(|boundary| *boundary <= block)
    }

    /// Boundaries strictly inside the range, ascending.
    pub fn inside(&self, range: BlockRange) -> impl Iterator<Item = u64> + '_ {
        let start = self.0.partition_point(|boundary| *boundary <= range.from_block());
        self.0[start..]
            .iter()
            .copied()
            .take_while(move |boundary| *boundary < range.to_block())
    }
}

/// One unit of work inside a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedJob {
    pub order: u64,
    pub range: BlockRange,
    pub version: usize,
}

/// Splits a span into jobs of at most `max_blocks` blocks, additionally cut
/// at every version boundary so no job straddles two data source versions.
/// Orders are assigned left to right starting at 1.
pub fn decompose_span(
    span: BlockRange,
    max_blocks: u64,
    boundaries: &VersionBoundaries,
) -> Vec<PlannedJob> {
    let max_blocks = max_blocks.max(1);
    let mut jobs = Vec::new();
    let mut order = 0u64;
    let mut chunk_start = span.from_block();

    while chunk_start < span.to_block() {
        let chunk_end = chunk_start.saturating_add(max_blocks).min(span.to_block());
        let Ok(chunk) = BlockRange::new(chunk_start, chunk_end) else {
            break;
        };

        let mut remainder = chunk;
        for boundary in boundaries.inside(chunk) {
            if let Some((left, right)) = remainder.split_at(boundary) {
                order += 1;
                jobs.push(PlannedJob {
                    order,
                    range: left,
                    version: boundaries.version_at(left.from_block()),
                });
                remainder = right;
            }
        }
        order += 1;
        jobs.push(PlannedJob {
            order,
            range: remainder,
            version: boundaries.version_at(remainder.from_block()),
        });

        chunk_start = chunk_end;
    }

    jobs
}
