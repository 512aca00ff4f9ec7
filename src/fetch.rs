//! Fetching block ranges from data sources: capability traits, pagination,
//! retry policy, and the retrying job unit executed by the worker pool.

pub mod capability;
pub mod error;
pub mod job;
pub mod paginated;
pub(crate) mod retry;

pub use capability::{FetchCapability, FetchFuture, VersionedFetchers};
pub use error::FetchError;
pub use job::FetcherJob;
pub use paginated::{PageSource, PaginatedFetcher, DEFAULT_PAGE_SIZE};
