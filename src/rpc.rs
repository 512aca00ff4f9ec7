//! Ethereum JSON-RPC plumbing: client options, basic authentication, hex
//! helpers, the node client, and the `eth_getLogs` fetcher.

pub mod auth;
pub mod client;
pub mod helpers;
pub mod logs;
pub mod options;

pub use client::{NodeRpcClient, RpcError};
pub use auth::BasicAuth;
pub use helpers::{
    decode_token_text, is_hex_address, normalize_address, parse_hex_quantity, to_hex_quantity,
};
pub use logs::LogFetcher;
pub use options::RpcClientOptions;
