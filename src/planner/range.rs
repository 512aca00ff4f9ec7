use crate::fetch::error::FetchError;
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open block interval `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockRange {
    from: u64,
    to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Result<Self> {
        ensure!(from < to, "block range [{from}, {to}) is empty");
        Ok(Self { from, to })
    }

    pub fn from_block(&self) -> u64 {
        self.from
    }

    /// Exclusive upper bound.
    pub fn to_block(&self) -> u64 {
        self.to
    }

    /// Last block that belongs to the range.
    pub fn last_block(&self) -> u64 {
        self.to - 1
    }

    pub fn len(&self) -> u64 {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    pub fn contains(&self, block: u64) -> bool {
        self.from <= block && block < self.to
    }

    /// Splits the range into `[from, point)` and `[point, to)` when `point`
    /// falls strictly inside it.
    pub fn split_at(&self, point: u64) -> Option<(BlockRange, BlockRange)> {
        if point <= self.from || point >= self.to {
            return None;
        }
        Some((
            BlockRange {
                from: self.from,
                to: point,
            },
            BlockRange {
                from: point,
                to: self.to,
            },
        ))
    }

    /// Converts into the inclusive `[from, to - 1]` bounds data sources
    /// expect. Bounds that do not fit a signed 64-bit block number are
    /// rejected instead of truncated.
    pub fn to_inclusive(&self) -> Result<InclusiveBlockQuery> {
        Ok(InclusiveBlockQuery {
            start_block: checked_block(self.from)?,
            end_block: checked_block(self.last_block())?,
        })
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from, self.to)
    }
}

/// Inclusive block bounds as sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusiveBlockQuery {
    pub start_block: i64,
    pub end_block: i64,
}

fn checked_block(block: u64) -> Result<i64> {
    i64::try_from(block).map_err(|_| {
        FetchError::Malformed {
            reason: format!("unsupported block: number={block}"),
        }
        .into()
    })
}
