//! Client for Etherscan-compatible explorer APIs and the fetcher that turns
//! its paged `module=account` listings into [`Record`](crate::records::Record)s.

pub mod client;
pub mod fetcher;
pub mod types;

pub use client::{ExplorerClient, ExplorerClientOptions, DEFAULT_EXPLORER_URL};
pub use fetcher::{ExplorerFetcher, ExplorerPageSource};
pub use types::TransactionKind;
