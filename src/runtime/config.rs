use crate::runtime::sink::OutputFormat;
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_FETCH_INTERVAL_SECS: u64 = 60;
const DEFAULT_TICK_SECS: u64 = 1;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Runtime configuration for the tailer.
///
/// All instances must be constructed via [`TailerConfig::builder`] so invariants
/// are validated before any consumer observes the values. Everything here is
/// static for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailerConfig {
    endpoint: String,
    access_key: String,
    secret_key: String,
    region: String,
    group: Option<String>,
    stream: Option<String>,
    stream_prefix: Option<String>,
    tag: String,
    checkpoint_path: PathBuf,
    fetch_interval: Duration,
    tick: Duration,
    request_timeout: Duration,
    metrics_interval: Duration,
    proxy: Option<String>,
    output_format: OutputFormat,
}

impl TailerConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> TailerConfigBuilder {
        TailerConfigBuilder::default()
    }

    /// Base URL (including scheme) of the log-storage gateway.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Fixed log group, if any. `None` enumerates every group each cycle.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Fixed log stream, if any. Only valid together with a fixed group.
    pub fn stream(&self) -> Option<&str> {
        self.stream.as_deref()
    }

    /// Name prefix applied to enumerated streams.
    pub fn stream_prefix(&self) -> Option<&str> {
        self.stream_prefix.as_deref()
    }

    /// Tag attached to every emitted record.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Fixed cadence between poll cycles.
    pub fn fetch_interval(&self) -> Duration {
        self.fetch_interval
    }

    /// Idle wait between schedule checks inside the poll loop.
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// Transport timeout applied by the remote client.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    /// Liveness age after which the watchdog restarts the worker.
    pub fn stall_threshold(&self) -> Duration {
        self.fetch_interval.saturating_mul(2)
    }

    /// How often the watchdog inspects the liveness marker.
    pub fn watchdog_period(&self) -> Duration {
        self.fetch_interval / 2
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.endpoint, "endpoint")?;
        ensure_not_empty(&self.access_key, "access_key")?;
        ensure_not_empty(&self.secret_key, "secret_key")?;
        ensure_not_empty(&self.region, "region")?;
        ensure_not_empty(&self.tag, "tag")?;

        if let Some(group) = &self.group {
            ensure_not_empty(group, "group")?;
        }

        if let Some(stream) = &self.stream {
            ensure_not_empty(stream, "stream")?;
            if self.group.is_none() {
                bail!("stream requires group to be set");
            }
        }

        if self.stream.is_some() && self.stream_prefix.is_some() {
            bail!("stream and stream_prefix are mutually exclusive");
        }

        if self.checkpoint_path.as_os_str().is_empty() {
            bail!("checkpoint_path cannot be empty");
        }

        if self.fetch_interval.is_zero() {
            bail!("fetch_interval must be greater than 0");
        }

        if self.tick.is_zero() {
            bail!("tick must be greater than 0");
        }

        if self.tick > self.fetch_interval {
            bail!("tick must not exceed fetch_interval");
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if let Some(proxy) = &self.proxy {
            validate_url(proxy, "proxy")?;
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct TailerConfigBuilder {
    endpoint: Option<String>,
    access_key: Option<String>,
    secret_key: Option<String>,
    region: Option<String>,
    group: Option<String>,
    stream: Option<String>,
    stream_prefix: Option<String>,
    tag: Option<String>,
    checkpoint_path: Option<PathBuf>,
    fetch_interval: Option<Duration>,
    tick: Option<Duration>,
    request_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
    proxy: Option<String>,
    output_format: Option<OutputFormat>,
}

impl TailerConfigBuilder {
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    pub fn access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = Some(key.into());
        self
    }

    pub fn secret_key(mut self, key: impl Into<String>) -> Self {
        self.secret_key = Some(key.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    pub fn stream_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stream_prefix = Some(prefix.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    pub fn fetch_interval(mut self, interval: Duration) -> Self {
        self.fetch_interval = Some(interval);
        self
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = Some(tick);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn build(self) -> Result<TailerConfig> {
        let config = TailerConfig {
            endpoint: trimmed_string(self.endpoint.context("endpoint is required")?),
            access_key: trimmed_string(self.access_key.context("access_key is required")?),
            secret_key: trimmed_string(self.secret_key.context("secret_key is required")?),
            region: trimmed_string(self.region.context("region is required")?),
            group: self.group.map(trimmed_string),
            stream: self.stream.map(trimmed_string),
            stream_prefix: self.stream_prefix.filter(|prefix| !prefix.is_empty()),
            tag: trimmed_string(self.tag.context("tag is required")?),
            checkpoint_path: self
                .checkpoint_path
                .context("checkpoint_path is required")?,
            fetch_interval: self
                .fetch_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_FETCH_INTERVAL_SECS)),
            tick: self
                .tick
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_TICK_SECS)),
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            proxy: self.proxy.map(trimmed_string),
            output_format: self.output_format.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str, field: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("{field} must start with http:// or https://");
    }
    Ok(())
}
