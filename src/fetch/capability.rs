use crate::planner::{BlockRange, VersionBoundaries};
use crate::records::Record;
use anyhow::{ensure, Result};
use futures::future::BoxFuture;
use std::sync::Arc;

pub type FetchFuture<'a> = BoxFuture<'a, Result<Vec<Record>>>;

/// A data source able to return every record in a half-open block range.
///
/// Implementations classify their failures with
/// [`FetchError`](crate::fetch::FetchError) when they can: `Malformed`
/// aborts retries, anything unclassified is retried by the job.
pub trait FetchCapability: Send + Sync {
    fn fetch<'a>(&'a self, range: BlockRange) -> FetchFuture<'a>;

    fn label(&self) -> &str {
        "fetcher"
    }
}

impl<T: FetchCapability + ?Sized> FetchCapability for Arc<T> {
    fn fetch<'a>(&'a self, range: BlockRange) -> FetchFuture<'a> {
        (**self).fetch(range)
    }

    fn label(&self) -> &str {
        (**self).label()
    }
}

/// Maps a data source version to the fetcher that understands it.
#[derive(Clone)]
pub struct VersionedFetchers {
    sources: Vec<Arc<dyn FetchCapability>>,
}

impl VersionedFetchers {
    /// One fetcher for every version.
    pub fn single(source: Arc<dyn FetchCapability>) -> Self {
        Self {
            sources: vec![source],
        }
    }

    /// One fetcher per version; `sources[i]` serves version `i`.
    pub fn per_version(
        sources: Vec<Arc<dyn FetchCapability>>,
        boundaries: &VersionBoundaries,
    ) -> Result<Self> {
        ensure!(
            sources.len() == boundaries.version_count(),
            "expected {} fetchers for {} version boundaries, got {}",
            boundaries.version_count(),
            boundaries.len(),
            sources.len()
        );
        Ok(Self { sources })
    }

    pub fn for_version(&self, version: usize) -> Arc<dyn FetchCapability> {
        let index = version.min(self.sources.len().saturating_sub(1));
        Arc::clone(&self.sources[index])
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
