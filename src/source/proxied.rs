//! JSON-RPC over a `reqwest` client routed through a forward proxy. The
//! jsonrpsee HTTP transport cannot be pointed at a proxy, so configured proxies
//! use this path instead.

use crate::source::client::SourceError;
use crate::source::options::SourceClientOptions;
use anyhow::{Context, Result};
use jsonrpsee::http_client::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub(crate) struct ProxiedTransport {
    endpoint: String,
    client: reqwest::Client,
    max_response_body_bytes: usize,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    message: String,
}

impl ProxiedTransport {
    pub(crate) fn new(
        endpoint: &str,
        proxy: &str,
        headers: HeaderMap,
        options: &SourceClientOptions,
    ) -> Result<Self> {
        let proxy = reqwest::Proxy::all(proxy).with_context(|| format!("invalid proxy url {proxy}"))?;
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.request_timeout)
            .proxy(proxy)
            .build()
            .context("failed to build proxied HTTP client")?;

        Ok(Self {
            endpoint: endpoint.to_owned(),
            client,
            max_response_body_bytes: options.max_response_body_bytes,
            next_id: AtomicU64::new(0),
        })
    }

    pub(crate) async fn request<R>(&self, method: &'static str, params: Vec<Value>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(method, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(call_error(method, format!("HTTP status {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| transport_error(method, err))?;
        if bytes.len() > self.max_response_body_bytes {
            return Err(call_error(
                method,
                format!(
                    "response of {} bytes exceeds limit of {}",
                    bytes.len(),
                    self.max_response_body_bytes
                ),
            ));
        }

        decode_response(method, &bytes)
    }
}

fn decode_response<R: DeserializeOwned>(method: &'static str, bytes: &[u8]) -> Result<R> {
    let envelope: ResponseEnvelope = serde_json::from_slice(bytes)
        .map_err(|err| call_error(method, format!("invalid JSON-RPC response: {err}")))?;

    match envelope {
        ResponseEnvelope {
            error: Some(error), ..
        } => Err(call_error(
            method,
            format!("code={}, message={}", error.code, error.message),
        )),
        ResponseEnvelope {
            result: Some(result),
            ..
        } => serde_json::from_value(result)
            .map_err(|err| call_error(method, format!("unexpected result shape: {err}"))),
        _ => Err(call_error(method, "response carries neither result nor error".to_owned())),
    }
}

fn transport_error(method: &'static str, err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        SourceError::Timeout { method }.into()
    } else {
        call_error(method, err.to_string())
    }
}

fn call_error(method: &'static str, message: String) -> anyhow::Error {
    SourceError::Call { method, message }.into()
}
