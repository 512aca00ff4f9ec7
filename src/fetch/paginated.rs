use crate::fetch::error::FetchError;
use crate::planner::{BlockRange, InclusiveBlockQuery};
use anyhow::Result;
use futures::future::BoxFuture;
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: usize = 500;

/// A paged listing keyed by a target (an address, a contract) and inclusive
/// block bounds. Pages are numbered from 1.
pub trait PageSource: Send + Sync {
    type Item: Send;

    fn fetch_page<'a>(
        &'a self,
        target: &'a str,
        query: InclusiveBlockQuery,
        page: usize,
        page_size: usize,
    ) -> BoxFuture<'a, Result<Vec<Self::Item>>>;

    fn label(&self) -> &'static str;
}

/// Requests successive pages until the source signals
/// [`FetchError::NoData`] or returns an empty page. A short page does not end
/// the listing on its own.
pub struct PaginatedFetcher<S> {
    source: S,
    page_size: usize,
}

impl<S: PageSource> PaginatedFetcher<S> {
    pub fn new(source: S) -> Self {
        Self::with_page_size(source, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(source: S, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub async fn fetch(&self, target: &str, range: BlockRange) -> Result<Vec<S::Item>> {
        let query = range.to_inclusive()?;
        let mut results = Vec::new();
        let mut page = 1;

        loop {
            match self
                .source
                .fetch_page(target, query, page, self.page_size)
                .await
            {
                Ok(items) if items.is_empty() => break,
                Ok(items) => {
                    debug!(
                        source = self.source.label(),
                        target,
                        page,
                        count = items.len(),
                        "fetched page"
                    );
                    results.extend(items);
                    page += 1;
                }
                Err(err) if FetchError::is_no_data(&err) => break,
                Err(err) => {
                    return Err(err.context(format!(
                        "failed to fetch {} page {page} for {target} in {range}",
                        self.source.label()
                    )))
                }
            }
        }

        debug!(
            source = self.source.label(),
            target,
            %range,
            pages = page - 1,
            total = results.len(),
            "pagination finished"
        );
        Ok(results)
    }
}
