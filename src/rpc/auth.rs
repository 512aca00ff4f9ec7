//! HTTP basic authentication for nodes that sit behind a password-protected
//! proxy.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use jsonrpsee::http_client::{HeaderMap, HeaderValue};

/// Basic credentials for a node endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub user: String,
    pub password: String,
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// Headers for the JSON-RPC client; empty when no credentials are configured.
pub(crate) fn build_auth_headers(auth: Option<&BasicAuth>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(auth) = auth {
        let encoded = BASE64_STANDARD.encode(format!("{}:{}", auth.user, auth.password));
        let value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .context("failed to build Authorization header")?;
        headers.insert("Authorization", value);
    }
    Ok(headers)
}
