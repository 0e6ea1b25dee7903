use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use streamtail::{
    init_tracing, JsonRpcLogSource, OutputFormat, Runner, StdoutSink, TailerConfig,
};

#[derive(Debug, Parser)]
#[command(
    name = "streamtail",
    about = "Tail remote log streams into newline-delimited records",
    long_about = "Poll a remote log-storage service on a fixed cadence, resume every stream from its persisted continuation token, and write one record per event to stdout.",
    after_help = "Every option can also be supplied through the STREAMTAIL_* environment variable shown next to it."
)]
struct Cli {
    #[arg(long, env = "STREAMTAIL_ENDPOINT", help = "Log service JSON-RPC endpoint")]
    endpoint: String,
    #[arg(long = "access-key", env = "STREAMTAIL_ACCESS_KEY", hide_env_values = true)]
    access_key: String,
    #[arg(long = "secret-key", env = "STREAMTAIL_SECRET_KEY", hide_env_values = true)]
    secret_key: String,
    #[arg(long, env = "STREAMTAIL_REGION")]
    region: String,
    #[arg(
        long,
        env = "STREAMTAIL_GROUP",
        help = "Restrict polling to one log group (all groups when omitted)"
    )]
    group: Option<String>,
    #[arg(
        long,
        env = "STREAMTAIL_STREAM",
        requires = "group",
        help = "Poll exactly one stream of --group"
    )]
    stream: Option<String>,
    #[arg(
        long = "stream-prefix",
        env = "STREAMTAIL_STREAM_PREFIX",
        conflicts_with = "stream",
        help = "Only poll streams whose name starts with this prefix"
    )]
    stream_prefix: Option<String>,
    #[arg(long, env = "STREAMTAIL_TAG", help = "Tag attached to every emitted record")]
    tag: String,
    #[arg(
        long = "checkpoint-path",
        env = "STREAMTAIL_CHECKPOINT_PATH",
        value_name = "PATH",
        help = "YAML file holding the continuation token of every stream"
    )]
    checkpoint_path: PathBuf,
    #[arg(
        long = "interval-secs",
        env = "STREAMTAIL_INTERVAL_SECS",
        default_value_t = 60,
        value_parser = parse_positive_secs,
        help = "Seconds between poll cycles"
    )]
    interval_secs: u64,
    #[arg(
        long = "request-timeout-secs",
        env = "STREAMTAIL_REQUEST_TIMEOUT_SECS",
        default_value_t = 10,
        value_parser = parse_positive_secs
    )]
    request_timeout_secs: u64,
    #[arg(
        long = "metrics-interval-secs",
        env = "STREAMTAIL_METRICS_INTERVAL_SECS",
        default_value_t = 30,
        value_parser = parse_positive_secs
    )]
    metrics_interval_secs: u64,
    #[arg(
        long,
        env = "STREAMTAIL_PROXY",
        help = "HTTP proxy URL that all log-service calls are routed through"
    )]
    proxy: Option<String>,
    #[arg(
        long = "format",
        env = "STREAMTAIL_FORMAT",
        default_value = "json",
        help = "Output line format: json or kv"
    )]
    format: OutputFormat,
}

fn parse_positive_secs(raw: &str) -> Result<u64, String> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err("must be greater than 0".to_owned()),
        Ok(value) => Ok(value),
        Err(err) => Err(err.to_string()),
    }
}

impl Cli {
    fn into_config(self) -> Result<TailerConfig> {
        let mut builder = TailerConfig::builder()
            .endpoint(self.endpoint)
            .access_key(self.access_key)
            .secret_key(self.secret_key)
            .region(self.region)
            .tag(self.tag)
            .checkpoint_path(self.checkpoint_path)
            .fetch_interval(Duration::from_secs(self.interval_secs))
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
            .metrics_interval(Duration::from_secs(self.metrics_interval_secs))
            .output_format(self.format);

        if let Some(group) = self.group {
            builder = builder.group(group);
        }
        if let Some(stream) = self.stream {
            builder = builder.stream(stream);
        }
        if let Some(prefix) = self.stream_prefix {
            builder = builder.stream_prefix(prefix);
        }
        if let Some(proxy) = self.proxy {
            builder = builder.proxy(proxy);
        }

        builder.build().context("invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Cli::parse().into_config()?;

    let source = JsonRpcLogSource::from_config(&config)?;
    let sink = StdoutSink::new(config.output_format());
    let mut runner = Runner::new(config, Arc::new(source), Arc::new(sink));
    runner.run_until_ctrl_c().await
}
