use crate::explorer::types::{ExplorerEnvelope, TransactionKind};
use crate::planner::InclusiveBlockQuery;
use crate::runtime::telemetry::Telemetry;
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_EXPLORER_URL: &str = "https://api.etherscan.io/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ExplorerClientOptions {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

impl Default for ExplorerClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_EXPLORER_URL.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ExplorerClientOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            bail!("base_url must not be empty");
        }
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        Ok(())
    }
}

/// Thin HTTP client over the explorer's `module=account` listings.
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    http: reqwest::Client,
    options: Arc<ExplorerClientOptions>,
    telemetry: Option<Arc<Telemetry>>,
}

impl ExplorerClient {
    pub fn new(options: ExplorerClientOptions) -> Result<Self> {
        options.validate()?;

        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .context("failed to build explorer HTTP client")?;

        Ok(Self {
            http,
            options: Arc::new(options),
            telemetry: None,
        })
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.options.base_url
    }

    /// Raw items of one page of `kind` for `address`. `page` starts at 1;
    /// `query` bounds are inclusive.
    pub async fn fetch_page(
        &self,
        kind: TransactionKind,
        address: &str,
        query: InclusiveBlockQuery,
        page: usize,
        offset: usize,
    ) -> Result<Vec<Value>> {
        let mut params = vec![
            ("module", "account".to_string()),
            ("action", kind.action().to_string()),
            ("address", address.to_string()),
            ("startblock", query.start_block.to_string()),
            ("endblock", query.end_block.to_string()),
            ("page", page.to_string()),
            ("offset", offset.to_string()),
            ("sort", "asc".to_string()),
        ];
        if let Some(api_key) = &self.options.api_key {
            params.push(("apikey", api_key.clone()));
        }

        let response = match self
            .http
            .get(&self.options.base_url)
            .query(&params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                self.record_failure(err.is_timeout());
                return Err(err).with_context(|| {
                    format!("explorer {} request failed for {address}", kind.action())
                });
            }
        };

        if !response.status().is_success() {
            self.record_failure(false);
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("explorer returned HTTP {status}: {body}");
        }

        let body = response.text().await.map_err(|err| {
            self.record_failure(err.is_timeout());
            anyhow::Error::new(err).context("failed to read explorer response")
        })?;

        ExplorerEnvelope::parse(&body)?.into_items()
    }

    fn record_failure(&self, timed_out: bool) {
        if let Some(telemetry) = &self.telemetry {
            if timed_out {
                telemetry.record_rpc_timeout();
            } else {
                telemetry.record_rpc_error();
            }
        }
    }
}
