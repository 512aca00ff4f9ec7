//! JSON-RPC client for Ethereum nodes. [`NodeRpcClient`] wraps a jsonrpsee
//! HTTP client with per-call timeouts and error classification, and serves
//! as the chain head source, the `eth_getLogs` transport, and the token
//! metadata resolver.

use crate::planner::InclusiveBlockQuery;
use crate::records::EventLog;
use crate::rpc::auth::{build_auth_headers, BasicAuth};
use crate::rpc::helpers::{decode_token_text, parse_hex_quantity, to_hex_quantity};
use crate::rpc::options::RpcClientOptions;
use crate::runtime::telemetry::Telemetry;
use crate::storage::ChainHead;
use crate::tokens::TokenResolver;
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::client::{ClientT, Error as JsonRpcError};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{fmt, sync::Arc};
use tokio::time::timeout;

const SYMBOL_SELECTOR: &str = "0x95d89b41";
const NAME_SELECTOR: &str = "0x06fdde03";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    Timeout {
        method: &'static str,
    },
    /// The node answered with a JSON-RPC error object.
    Remote {
        method: &'static str,
        code: i32,
        message: String,
    },
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
            RpcError::Remote {
                method,
                code,
                message,
            } => write!(f, "rpc {method} call failed (code={code}, message={message})"),
        }
    }
}

impl std::error::Error for RpcError {}

#[derive(Debug, Clone)]
pub struct NodeRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    telemetry: Option<Arc<Telemetry>>,
}

impl NodeRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, RpcClientOptions::default())
    }

    pub fn with_options(url: impl Into<String>, options: RpcClientOptions) -> Result<Self> {
        Self::build(url.into(), None, options)
    }

    pub fn with_basic_auth(
        url: impl Into<String>,
        auth: BasicAuth,
        options: RpcClientOptions,
    ) -> Result<Self> {
        Self::build(url.into(), Some(&auth), options)
    }

    fn build(rpc_url: String, auth: Option<&BasicAuth>, options: RpcClientOptions) -> Result<Self> {
        options.validate()?;

        let headers = build_auth_headers(auth)?;
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            telemetry: None,
        })
    }

    /// Counts timeouts and node errors into `telemetry`.
    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub fn options(&self) -> &RpcClientOptions {
        &self.options
    }

    async fn request<R>(&self, method: &'static str, params: ArrayParams) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let outcome = timeout(
            self.options.request_timeout,
            self.client.request::<R, _>(method, params),
        )
        .await;

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                if let Some(telemetry) = &self.telemetry {
                    telemetry.record_rpc_error();
                }
                Err(map_rpc_error(method, err))
            }
            Err(_) => {
                if let Some(telemetry) = &self.telemetry {
                    telemetry.record_rpc_timeout();
                }
                Err(RpcError::Timeout { method }.into())
            }
        }
    }

    pub async fn block_number(&self) -> Result<u64> {
        let raw: String = self.request("eth_blockNumber", rpc_params![]).await?;
        let block = parse_hex_quantity(&raw).context("eth_blockNumber returned a bad quantity")?;
        tracing::debug!(block, endpoint = %self.rpc_url, "refreshed chain head");
        Ok(block)
    }

    /// Every log emitted by `addresses` in the inclusive block window.
    /// An empty address list matches every contract.
    pub async fn get_logs(
        &self,
        addresses: &[String],
        query: InclusiveBlockQuery,
    ) -> Result<Vec<EventLog>> {
        let filter = log_filter(addresses, query);
        let logs: Vec<RpcLog> = self.request("eth_getLogs", rpc_params![filter]).await?;
        tracing::debug!(
            count = logs.len(),
            start_block = query.start_block,
            end_block = query.end_block,
            "eth_getLogs completed"
        );
        logs.into_iter().map(EventLog::try_from).collect()
    }

    /// Read-only contract call against the latest block; returns raw hex.
    pub async fn call(&self, to: &str, data: &str) -> Result<String> {
        let request = json!({ "to": to, "data": data });
        self.request("eth_call", rpc_params![request, "latest"])
            .await
    }
}

impl ChainHead for NodeRpcClient {
    fn latest_block<'a>(&'a self) -> BoxFuture<'a, Result<u64>> {
        Box::pin(self.block_number())
    }
}

impl TokenResolver for NodeRpcClient {
    fn resolve_symbol<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let raw = self.call(address, SYMBOL_SELECTOR).await?;
            decode_token_text(&raw).with_context(|| format!("symbol() of {address}"))
        })
    }

    fn resolve_name<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let raw = self.call(address, NAME_SELECTOR).await?;
            decode_token_text(&raw).with_context(|| format!("name() of {address}"))
        })
    }
}

fn log_filter(addresses: &[String], query: InclusiveBlockQuery) -> Value {
    let mut filter = json!({
        "fromBlock": to_hex_quantity(query.start_block as u64),
        "toBlock": to_hex_quantity(query.end_block as u64),
    });
    if !addresses.is_empty() {
        filter["address"] = json!(addresses);
    }
    filter
}

fn map_rpc_error(method: &'static str, err: JsonRpcError) -> anyhow::Error {
    match err {
        JsonRpcError::Call(object) => RpcError::Remote {
            method,
            code: object.code(),
            message: object.message().to_string(),
        }
        .into(),
        other => anyhow!("rpc {method} call failed: {other}"),
    }
}

/// Log object as serialized by the node.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    block_hash: Option<String>,
    transaction_hash: Option<String>,
    transaction_index: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

impl TryFrom<RpcLog> for EventLog {
    type Error = anyhow::Error;

    fn try_from(log: RpcLog) -> Result<Self> {
        let required = |field: Option<String>, name: &str| {
            field.ok_or_else(|| {
                crate::fetch::FetchError::malformed(format!("log without {name}: pending log?"))
            })
        };

        let block_number = parse_hex_quantity(&required(log.block_number, "blockNumber")?)?;
        let transaction_index =
            parse_hex_quantity(&required(log.transaction_index, "transactionIndex")?)?;
        let log_index = parse_hex_quantity(&required(log.log_index, "logIndex")?)?;

        Ok(EventLog {
            block_number,
            block_hash: required(log.block_hash, "blockHash")?,
            transaction_hash: required(log.transaction_hash, "transactionHash")?,
            transaction_index,
            log_index,
            address: log.address.to_ascii_lowercase(),
            topics: log.topics,
            data: log.data,
            removed: log.removed,
        })
    }
}
