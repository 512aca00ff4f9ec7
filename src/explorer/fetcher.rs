use crate::explorer::client::ExplorerClient;
use crate::explorer::types::TransactionKind;
use crate::fetch::{FetchCapability, FetchError, FetchFuture, PageSource, PaginatedFetcher};
use crate::planner::{BlockRange, InclusiveBlockQuery};
use crate::records::Record;
use crate::runtime::config::CrawlConfig;
use crate::rpc::helpers::{is_hex_address, normalize_address};
use anyhow::{ensure, Result};
use futures::future::BoxFuture;

/// One explorer listing, decoded into records page by page.
#[derive(Debug, Clone)]
pub struct ExplorerPageSource {
    client: ExplorerClient,
    kind: TransactionKind,
}

impl ExplorerPageSource {
    pub fn new(client: ExplorerClient, kind: TransactionKind) -> Self {
        Self { client, kind }
    }

    pub fn kind(&self) -> TransactionKind {
        self.kind
    }
}

impl PageSource for ExplorerPageSource {
    type Item = Record;

    fn fetch_page<'a>(
        &'a self,
        target: &'a str,
        query: InclusiveBlockQuery,
        page: usize,
        page_size: usize,
    ) -> BoxFuture<'a, Result<Vec<Record>>> {
        Box::pin(async move {
            let items = self
                .client
                .fetch_page(self.kind, target, query, page, page_size)
                .await?;
            self.kind.decode(items)
        })
    }

    fn label(&self) -> &'static str {
        self.kind.label()
    }
}

/// Every listed transaction of an address set. Results are concatenated per
/// address, then per kind, in the order both were given.
pub struct ExplorerFetcher {
    addresses: Vec<String>,
    listings: Vec<PaginatedFetcher<ExplorerPageSource>>,
}

impl ExplorerFetcher {
    pub fn new<I, A>(client: ExplorerClient, addresses: I, kinds: &[TransactionKind]) -> Result<Self>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let mut validated = Vec::new();
        for address in addresses {
            let address = address.as_ref();
            if !is_hex_address(address.trim()) {
                return Err(FetchError::malformed(format!(
                    "invalid address provided: address={address}"
                ))
                .into());
            }
            let address = normalize_address(address);
            if !validated.contains(&address) {
                validated.push(address);
            }
        }
        ensure!(!validated.is_empty(), "at least one address is required");
        ensure!(!kinds.is_empty(), "at least one transaction kind is required");

        let listings = kinds
            .iter()
            .map(|kind| PaginatedFetcher::new(ExplorerPageSource::new(client.clone(), *kind)))
            .collect();

        Ok(Self {
            addresses: validated,
            listings,
        })
    }

    /// Like [`ExplorerFetcher::new`], paging with the crawl's configured page size.
    pub fn from_config<I, A>(
        client: ExplorerClient,
        addresses: I,
        kinds: &[TransactionKind],
        config: &CrawlConfig,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        Ok(Self::new(client, addresses, kinds)?.with_page_size(config.page_size()))
    }

    /// Overrides the `offset` sent with every page request.
    pub fn with_page_size(self, page_size: usize) -> Self {
        let listings = self
            .listings
            .into_iter()
            .map(|listing| {
                let source = listing.source().clone();
                PaginatedFetcher::with_page_size(source, page_size)
            })
            .collect();
        Self {
            addresses: self.addresses,
            listings,
        }
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn kinds(&self) -> Vec<TransactionKind> {
        self.listings
            .iter()
            .map(|listing| listing.source().kind())
            .collect()
    }

    async fn fetch_all(&self, range: BlockRange) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for address in &self.addresses {
            for listing in &self.listings {
                let found = listing.fetch(address, range).await?;
                tracing::debug!(
                    address = %address,
                    kind = listing.source().kind().label(),
                    from_block = range.from_block(),
                    to_block = range.to_block(),
                    records = found.len(),
                    "explorer listing fetched"
                );
                records.extend(found);
            }
        }
        Ok(records)
    }
}

impl FetchCapability for ExplorerFetcher {
    fn fetch<'a>(&'a self, range: BlockRange) -> FetchFuture<'a> {
        Box::pin(self.fetch_all(range))
    }

    fn label(&self) -> &str {
        "explorer"
    }
}
