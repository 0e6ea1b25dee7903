//! JSON-RPC implementation of [`LogSource`] for log-storage gateways that
//! expose `listGroups`, `listStreams`, and `fetchEvents` over HTTP. Calls go
//! straight through jsonrpsee unless a proxy is configured.

use crate::runtime::config::TailerConfig;
use crate::source::auth::build_request_headers;
use crate::source::metrics::{CallKind, CallOutcome, SourceMetrics, SourceMetricsSnapshot};
use crate::source::options::SourceClientOptions;
use crate::source::proxied::ProxiedTransport;
use crate::source::types::{EventPage, LogSource, Target};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::client::{ClientT, Error as JsonRpcError};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::{timeout, Instant};

const LIST_GROUPS: &str = "listGroups";
const LIST_STREAMS: &str = "listStreams";
const FETCH_EVENTS: &str = "fetchEvents";

#[derive(Debug)]
pub enum SourceError {
    Timeout {
        method: &'static str,
    },
    Call {
        method: &'static str,
        message: String,
    },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Timeout { method } => write!(f, "remote call {method} timed out"),
            SourceError::Call { method, message } => {
                write!(f, "remote call {method} failed: {message}")
            }
        }
    }
}

impl std::error::Error for SourceError {}

#[derive(Debug, Clone)]
enum Transport {
    Direct(HttpClient),
    Proxied(Arc<ProxiedTransport>),
}

#[derive(Debug, Clone)]
pub struct JsonRpcLogSource {
    endpoint: Arc<String>,
    region: Arc<String>,
    transport: Transport,
    options: SourceClientOptions,
    metrics: Arc<SourceMetrics>,
}

impl JsonRpcLogSource {
    pub fn new(
        endpoint: impl Into<String>,
        access_key: &str,
        secret_key: &str,
        region: impl Into<String>,
    ) -> Result<Self> {
        Self::with_options(
            endpoint,
            access_key,
            secret_key,
            region,
            SourceClientOptions::default(),
        )
    }

    pub fn with_options(
        endpoint: impl Into<String>,
        access_key: &str,
        secret_key: &str,
        region: impl Into<String>,
        options: SourceClientOptions,
    ) -> Result<Self> {
        options.validate()?;

        let endpoint = endpoint.into();
        let region = region.into();
        let headers = build_request_headers(access_key, secret_key, &region)?;

        let transport = match options.proxy.as_deref() {
            Some(proxy) => {
                tracing::info!(proxy, "routing log source calls through proxy");
                Transport::Proxied(Arc::new(ProxiedTransport::new(
                    &endpoint, proxy, headers, &options,
                )?))
            }
            None => {
                let max_response_body_size =
                    options.max_response_body_bytes.min(u32::MAX as usize) as u32;
                let client = HttpClientBuilder::default()
                    .set_headers(headers)
                    .request_timeout(options.request_timeout)
                    .max_concurrent_requests(options.max_concurrent_requests)
                    .max_response_size(max_response_body_size)
                    .build(&endpoint)
                    .map_err(|err| anyhow!("failed to build log source client: {err}"))?;
                Transport::Direct(client)
            }
        };

        Ok(Self {
            endpoint: Arc::new(endpoint),
            region: Arc::new(region),
            transport,
            options,
            metrics: Arc::new(SourceMetrics::default()),
        })
    }

    pub fn from_config(config: &TailerConfig) -> Result<Self> {
        config.validate()?;
        let options = SourceClientOptions {
            request_timeout: config.request_timeout(),
            proxy: config.proxy().map(str::to_owned),
            ..SourceClientOptions::default()
        };
        Self::with_options(
            config.endpoint().to_owned(),
            config.access_key(),
            config.secret_key(),
            config.region().to_owned(),
            options,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn is_proxied(&self) -> bool {
        matches!(self.transport, Transport::Proxied(_))
    }

    pub fn metrics(&self) -> SourceMetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn call<R>(&self, method: &'static str, params: Vec<Value>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let kind = if method == FETCH_EVENTS {
            CallKind::Fetch
        } else {
            CallKind::Listing
        };
        let start = Instant::now();
        let outcome = timeout(self.options.request_timeout, self.dispatch::<R>(method, params)).await;

        match outcome {
            Err(_) => {
                self.metrics
                    .record(kind, CallOutcome::Timeout, start.elapsed());
                Err(SourceError::Timeout { method }.into())
            }
            Ok(Err(err)) => {
                let timed_out = matches!(
                    err.downcast_ref::<SourceError>(),
                    Some(SourceError::Timeout { .. })
                );
                let outcome = if timed_out {
                    CallOutcome::Timeout
                } else {
                    CallOutcome::Failure
                };
                self.metrics.record(kind, outcome, start.elapsed());
                Err(err)
            }
            Ok(Ok(value)) => {
                let latency = start.elapsed();
                self.metrics.record(kind, CallOutcome::Success, latency);
                tracing::trace!(
                    method,
                    latency_ms = latency.as_millis() as u64,
                    "remote call completed"
                );
                Ok(value)
            }
        }
    }

    async fn dispatch<R>(&self, method: &'static str, params: Vec<Value>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        match &self.transport {
            Transport::Direct(client) => {
                let mut array = ArrayParams::new();
                for param in params {
                    array
                        .insert(param)
                        .map_err(|err| anyhow!("failed to encode {method} params: {err}"))?;
                }
                client
                    .request::<R, _>(method, array)
                    .await
                    .map_err(|err| map_call_error(method, err))
            }
            Transport::Proxied(proxied) => proxied.request(method, params).await,
        }
    }
}

impl LogSource for JsonRpcLogSource {
    fn list_groups(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(self.call(LIST_GROUPS, Vec::new()))
    }

    fn list_streams<'a>(&'a self, group: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(self.call(LIST_STREAMS, vec![json!(group)]))
    }

    fn fetch_events<'a>(
        &'a self,
        target: &'a Target,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<EventPage>> {
        Box::pin(self.call(
            FETCH_EVENTS,
            vec![json!(target.group()), json!(target.stream()), json!(token)],
        ))
    }

    fn call_metrics(&self) -> Option<SourceMetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}

fn map_call_error(method: &'static str, err: JsonRpcError) -> anyhow::Error {
    let message = match err {
        JsonRpcError::RequestTimeout => return SourceError::Timeout { method }.into(),
        JsonRpcError::Call(object) => format!("code={}, message={}", object.code(), object.message()),
        other => other.to_string(),
    };
    SourceError::Call { method, message }.into()
}
