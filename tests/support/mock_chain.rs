use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const SYMBOL_SELECTOR: &str = "0x95d89b41";
const NAME_SELECTOR: &str = "0x06fdde03";

/// In-memory chain history served both as an Etherscan-style REST API
/// (GET) and as an Ethereum JSON-RPC node (POST).
#[derive(Clone)]
pub struct MockChain {
    inner: Arc<Mutex<MockChainInner>>,
    head: Arc<AtomicU64>,
    explorer_requests: Arc<AtomicUsize>,
    rpc_requests: Arc<AtomicUsize>,
}

#[derive(Default)]
struct MockChainInner {
    listings: HashMap<(String, String), Vec<Value>>,
    logs: Vec<Value>,
    tokens: HashMap<String, (String, String)>,
    transient_failures: usize,
    poisoned_blocks: Vec<u64>,
    explorer_offsets: Vec<u64>,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockChainInner::default())),
            head: Arc::new(AtomicU64::new(head)),
            explorer_requests: Arc::new(AtomicUsize::new(0)),
            rpc_requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, MockChainInner> {
        self.inner.lock().expect("mock chain poisoned")
    }

    pub fn head(&self) -> u64 {
        self.head.load(Ordering::SeqCst)
    }

    pub fn set_head(&self, block: u64) {
        self.head.store(block, Ordering::SeqCst);
    }

    pub fn add_normal_tx(&self, address: &str, block: u64) {
        let item = json!({
            "blockNumber": block.to_string(),
            "timeStamp": (1_518_000_000 + block).to_string(),
            "hash": tx_hash("a", block),
            "transactionIndex": "0",
            "from": address,
            "to": "0x0000000000000000000000000000000000000002",
            "value": "1000",
            "gas": "21000",
            "gasPrice": "20000000000",
            "gasUsed": "21000",
            "isError": "0",
            "contractAddress": ""
        });
        self.push_listing(address, "txlist", item);
    }

    pub fn add_internal_tx(&self, address: &str, block: u64) {
        let item = json!({
            "blockNumber": block.to_string(),
            "timeStamp": (1_518_000_000 + block).to_string(),
            "hash": tx_hash("b", block),
            "from": "0x0000000000000000000000000000000000000003",
            "to": address,
            "value": "5",
            "contractAddress": "",
            "type": "call",
            "traceId": "0",
            "isError": "0"
        });
        self.push_listing(address, "txlistinternal", item);
    }

    pub fn add_token_transfer(&self, address: &str, block: u64, token: &str) {
        let item = json!({
            "blockNumber": block.to_string(),
            "timeStamp": (1_518_000_000 + block).to_string(),
            "hash": tx_hash("c", block),
            "transactionIndex": "1",
            "from": address,
            "to": "0x0000000000000000000000000000000000000004",
            "value": "42",
            "contractAddress": token,
            "tokenName": "Mock Token",
            "tokenSymbol": "MOCK",
            "tokenDecimal": "18"
        });
        self.push_listing(address, "tokentx", item);
    }

    pub fn add_log(&self, address: &str, block: u64, log_index: u64) {
        let log = json!({
            "address": address,
            "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
            "data": "0x",
            "blockNumber": format!("{block:#x}"),
            "blockHash": format!("0x{block:064x}"),
            "transactionHash": tx_hash("d", block),
            "transactionIndex": "0x0",
            "logIndex": format!("{log_index:#x}"),
            "removed": false
        });
        self.inner().logs.push(log);
    }

    pub fn add_token(&self, address: &str, symbol: &str, name: &str) {
        self.inner().tokens.insert(
            address.to_ascii_lowercase(),
            (symbol.to_string(), name.to_string()),
        );
    }

    /// The next `count` explorer requests answer HTTP 503.
    pub fn fail_next_requests(&self, count: usize) {
        self.inner().transient_failures = count;
    }

    /// Every explorer or log request covering `block` fails permanently.
    pub fn poison_block(&self, block: u64) {
        self.inner().poisoned_blocks.push(block);
    }

    pub fn explorer_requests(&self) -> usize {
        self.explorer_requests.load(Ordering::SeqCst)
    }

    /// `offset` of every explorer listing request, in arrival order.
    pub fn explorer_offsets(&self) -> Vec<u64> {
        self.inner().explorer_offsets.clone()
    }

    pub fn rpc_requests(&self) -> usize {
        self.rpc_requests.load(Ordering::SeqCst)
    }

    fn push_listing(&self, address: &str, action: &str, item: Value) {
        self.inner()
            .listings
            .entry((address.to_ascii_lowercase(), action.to_string()))
            .or_default()
            .push(item);
    }

    fn is_poisoned(&self, from: u64, to: u64) -> bool {
        self.inner()
            .poisoned_blocks
            .iter()
            .any(|block| (from..=to).contains(block))
    }

    fn take_transient_failure(&self) -> bool {
        let mut inner = self.inner();
        if inner.transient_failures > 0 {
            inner.transient_failures -= 1;
            true
        } else {
            false
        }
    }
}

fn tx_hash(prefix: &str, block: u64) -> String {
    format!("0x{prefix}{block:063x}")
}

fn item_block(item: &Value, field: &str, radix: u32) -> u64 {
    item.get(field)
        .and_then(Value::as_str)
        .map(|raw| raw.trim_start_matches("0x"))
        .and_then(|raw| u64::from_str_radix(raw, radix).ok())
        .unwrap_or_default()
}

pub struct MockChainServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockChainServer {
    pub async fn start(chain: MockChain) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock chain listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let chain = chain.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_request(chain.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock chain server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{addr}"),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.url
    }

    pub fn explorer_url(&self) -> String {
        format!("{}/api", self.url)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(chain: MockChain, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    match *req.method() {
        Method::GET => Ok(serve_explorer(&chain, req.uri().query().unwrap_or_default())),
        Method::POST => Ok(serve_rpc(&chain, req).await),
        _ => Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method")),
    }
}

fn serve_explorer(chain: &MockChain, query: &str) -> Response<Body> {
    chain.explorer_requests.fetch_add(1, Ordering::SeqCst);

    if chain.take_transient_failure() {
        return plain(StatusCode::SERVICE_UNAVAILABLE, "try again later");
    }

    let params: HashMap<&str, &str> = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .collect();
    let number = |key: &str| {
        params
            .get(key)
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or_default()
    };

    let start = number("startblock");
    let end = number("endblock");
    let page = number("page").max(1) as usize;
    chain.inner().explorer_offsets.push(number("offset"));
    let offset = number("offset").max(1) as usize;
    let action = params.get("action").copied().unwrap_or_default();
    let address = params
        .get("address")
        .map(|raw| raw.to_ascii_lowercase())
        .unwrap_or_default();

    if chain.is_poisoned(start, end) {
        return json_response(json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Error! Invalid block range"
        }));
    }

    let mut matching: Vec<Value> = chain
        .inner()
        .listings
        .get(&(address, action.to_string()))
        .map(|items| {
            items
                .iter()
                .filter(|item| (start..=end).contains(&item_block(item, "blockNumber", 10)))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    matching.sort_by_key(|item| item_block(item, "blockNumber", 10));

    let page_items: Vec<Value> = matching
        .into_iter()
        .skip((page - 1) * offset)
        .take(offset)
        .collect();

    if page_items.is_empty() {
        json_response(json!({
            "status": "0",
            "message": "No transactions found",
            "result": []
        }))
    } else {
        json_response(json!({
            "status": "1",
            "message": "OK",
            "result": page_items
        }))
    }
}

async fn serve_rpc(chain: &MockChain, req: Request<Body>) -> Response<Body> {
    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => return plain(StatusCode::BAD_REQUEST, format!("failed to read body: {err}")),
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => return plain(StatusCode::BAD_REQUEST, format!("invalid JSON payload: {err}")),
    };

    let response = if let Value::Array(calls) = payload {
        Value::Array(calls.into_iter().map(|call| handle_call(chain, call)).collect())
    } else {
        handle_call(chain, payload)
    };
    json_response(response)
}

fn handle_call(chain: &MockChain, call: Value) -> Value {
    chain.rpc_requests.fetch_add(1, Ordering::SeqCst);

    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let first_param = call
        .get("params")
        .and_then(Value::as_array)
        .and_then(|params| params.first())
        .cloned()
        .unwrap_or(Value::Null);

    match method.as_str() {
        "eth_blockNumber" => success(id, json!(format!("{:#x}", chain.head()))),
        "eth_getLogs" => {
            let from = item_block(&first_param, "fromBlock", 16);
            let to = item_block(&first_param, "toBlock", 16);
            if chain.is_poisoned(from, to) {
                return error(id, -32000, "query timeout exceeded");
            }
            let addresses: Vec<String> = first_param
                .get("address")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_ascii_lowercase)
                        .collect()
                })
                .unwrap_or_default();

            let logs: Vec<Value> = chain
                .inner()
                .logs
                .iter()
                .filter(|log| (from..=to).contains(&item_block(log, "blockNumber", 16)))
                .filter(|log| {
                    addresses.is_empty()
                        || log
                            .get("address")
                            .and_then(Value::as_str)
                            .map(|address| addresses.contains(&address.to_ascii_lowercase()))
                            .unwrap_or(false)
                })
                .cloned()
                .collect();
            success(id, Value::Array(logs))
        }
        "eth_call" => {
            let to = first_param
                .get("to")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_ascii_lowercase();
            let data = first_param
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let token = chain.inner().tokens.get(&to).cloned();
            match (token, data) {
                (Some((symbol, _)), SYMBOL_SELECTOR) => success(id, json!(abi_string(&symbol))),
                (Some((_, name)), NAME_SELECTOR) => success(id, json!(abi_string(&name))),
                _ => error(id, 3, "execution reverted"),
            }
        }
        _ => error(id, -32601, format!("unknown method {method}")),
    }
}

fn abi_string(text: &str) -> String {
    let mut encoded = format!("{:064x}{:064x}", 32, text.len());
    let mut data = hex::encode(text.as_bytes());
    let padded = data.len().div_ceil(64).max(1) * 64;
    data.extend(std::iter::repeat('0').take(padded - data.len()));
    encoded.push_str(&data);
    format!("0x{encoded}")
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}

fn json_response(value: Value) -> Response<Body> {
    let mut response = Response::new(Body::from(value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

fn plain(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;
    response
}
