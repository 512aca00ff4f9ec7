use crate::fetch::{FetchCapability, FetchError, FetchFuture};
use crate::planner::BlockRange;
use crate::records::Record;
use crate::rpc::client::NodeRpcClient;
use crate::rpc::helpers::{is_hex_address, normalize_address};
use anyhow::{Context, Result};

/// Fetches contract events for a fixed address set with `eth_getLogs`.
#[derive(Debug, Clone)]
pub struct LogFetcher {
    client: NodeRpcClient,
    addresses: Vec<String>,
}

impl LogFetcher {
    pub fn new<I, A>(client: NodeRpcClient, addresses: I) -> Result<Self>
    where
        I: IntoIterator<Item = A>,
        A: AsRef<str>,
    {
        let mut normalized = Vec::new();
        for address in addresses {
            let address = address.as_ref();
            if !is_hex_address(address.trim()) {
                return Err(FetchError::malformed(format!(
                    "invalid address provided: address={address}"
                ))
                .into());
            }
            let address = normalize_address(address);
            if !normalized.contains(&address) {
                normalized.push(address);
            }
        }

        Ok(Self {
            client,
            addresses: normalized,
        })
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    async fn fetch_logs(&self, range: BlockRange) -> Result<Vec<Record>> {
        let query = range.to_inclusive()?;
        let mut logs = self
            .client
            .get_logs(&self.addresses, query)
            .await
            .with_context(|| format!("failed to fetch logs in {range}"))?;
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs.into_iter().map(Record::EventLog).collect())
    }
}

impl FetchCapability for LogFetcher {
    fn fetch<'a>(&'a self, range: BlockRange) -> FetchFuture<'a> {
        Box::pin(self.fetch_logs(range))
    }

    fn label(&self) -> &str {
        "eth_getLogs"
    }
}
