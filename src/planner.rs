//! Crawl planning: half-open block ranges, span iteration, worker sizing,
//! and decomposition of spans into ordered jobs at version boundaries.

pub mod range;
pub mod span;
pub mod versions;

pub use range::{BlockRange, InclusiveBlockQuery};
pub use span::{required_workers, CrawlPlanner};
pub use versions::{decompose_span, PlannedJob, VersionBoundaries};
