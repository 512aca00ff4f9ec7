//! Token metadata lookups with a caller-owned cache.
//!
//! [`TokenInfoCache`] answers `symbol`/`name` queries from its map and only
//! falls through to the [`TokenResolver`] on a miss. Seeds come from the
//! caller's configuration; failed lookups are never cached.

use crate::rpc::helpers::normalize_address;
use anyhow::{Context, Result};
use dashmap::DashMap;
use futures::future::BoxFuture;

/// Placeholder address conventionally used for native ether.
pub const ETH_ADDRESS: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

pub trait TokenResolver: Send + Sync {
    fn resolve_symbol<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<String>>;

    fn resolve_name<'a>(&'a self, address: &'a str) -> BoxFuture<'a, Result<String>>;
}

pub struct TokenInfoCache<R> {
    resolver: R,
    symbols: DashMap<String, String>,
    names: DashMap<String, String>,
}

impl<R: TokenResolver> TokenInfoCache<R> {
    /// Empty cache apart from native ether, which has no contract to ask.
    pub fn new(resolver: R) -> Self {
        let cache = Self {
            resolver,
            symbols: DashMap::new(),
            names: DashMap::new(),
        };
        cache.symbols.insert(ETH_ADDRESS.to_string(), "ETH".to_string());
        cache.names.insert(ETH_ADDRESS.to_string(), "Ether".to_string());
        cache
    }

    pub fn with_symbols<I, K, V>(self, symbols: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (address, symbol) in symbols {
            let symbol: String = symbol.into();
            self.symbols
                .insert(normalize_address(address.as_ref()), symbol.to_uppercase());
        }
        self
    }

    /// Seeds names for tokens whose `name()` is broken on chain.
    pub fn with_names<I, K, V>(self, names: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (address, name) in names {
            self.names
                .insert(normalize_address(address.as_ref()), name.into());
        }
        self
    }

    /// Upper-cased symbol of the token at `address`.
    pub async fn symbol(&self, address: &str) -> Result<String> {
        let key = normalize_address(address);
        if let Some(symbol) = self.symbols.get(&key) {
            return Ok(symbol.value().clone());
        }

        let symbol = self
            .resolver
            .resolve_symbol(&key)
            .await
            .with_context(|| format!("failed to resolve token symbol: address={key}"))?
            .to_uppercase();
        tracing::debug!(address = %key, symbol = %symbol, "cached token symbol");
        // A concurrent resolve may have landed first; keep whichever is stored.
        let stored = self.symbols.entry(key).or_insert(symbol);
        Ok(stored.value().clone())
    }

    pub async fn name(&self, address: &str) -> Result<String> {
        let key = normalize_address(address);
        if let Some(name) = self.names.get(&key) {
            return Ok(name.value().clone());
        }

        let name = self
            .resolver
            .resolve_name(&key)
            .await
            .with_context(|| format!("failed to resolve token name: address={key}"))?;
        tracing::debug!(address = %key, name = %name, "cached token name");
        let stored = self.names.entry(key).or_insert(name);
        Ok(stored.value().clone())
    }

    pub fn cached_symbols(&self) -> usize {
        self.symbols.len()
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}
