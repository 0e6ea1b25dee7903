//! Transport knobs for the JSON-RPC log client.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 8;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct SourceClientOptions {
    pub request_timeout: Duration,
    pub max_concurrent_requests: usize,
    pub max_response_body_bytes: usize,
    /// Forward proxy for every call; switches the client to the proxied transport.
    pub proxy: Option<String>,
}

impl Default for SourceClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_response_body_bytes: DEFAULT_HTTP_BODY_LIMIT_BYTES,
            proxy: None,
        }
    }
}

impl SourceClientOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.max_concurrent_requests == 0 {
            bail!("max_concurrent_requests must be greater than 0");
        }
        if self.max_response_body_bytes == 0 {
            bail!("max_response_body_bytes must be greater than 0");
        }
        if self.proxy.as_deref().is_some_and(|proxy| proxy.trim().is_empty()) {
            bail!("proxy cannot be empty");
        }
        Ok(())
    }
}
