//! Downstream record sinks. The poller hands every extracted record to a
//! [`RecordSink`] and assumes the sink never blocks for long.

use anyhow::{anyhow, bail, Context, Result};
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::{mpsc, Mutex};

/// Unit handed to the downstream sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub tag: String,
    /// Seconds since the Unix epoch.
    pub time: i64,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(tag: impl Into<String>, time: i64, fields: Map<String, Value>) -> Self {
        Self {
            tag: tag.into(),
            time,
            fields,
        }
    }
}

pub trait RecordSink: Send + Sync {
    fn emit(&self, record: Record) -> BoxFuture<'_, Result<()>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One `{"tag", "time", "record"}` JSON object per line.
    #[default]
    Json,
    /// `time<TAB>tag<TAB>key=value ...` per line.
    KeyValue,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "kv" | "keyvalue" | "key_value" => Ok(OutputFormat::KeyValue),
            other => bail!("unknown output format {other:?} (expected json or kv)"),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::KeyValue => f.write_str("kv"),
        }
    }
}

impl OutputFormat {
    pub fn render(&self, record: &Record) -> Result<String> {
        match self {
            OutputFormat::Json => {
                let line = serde_json::json!({
                    "tag": record.tag,
                    "time": record.time,
                    "record": record.fields,
                });
                serde_json::to_string(&line).context("failed to encode record as JSON")
            }
            OutputFormat::KeyValue => {
                let mut line = format!("{}\t{}", record.time, escape_kv(&record.tag));
                let mut separator = '\t';
                for (key, value) in &record.fields {
                    line.push(separator);
                    line.push_str(&escape_kv(key));
                    line.push('=');
                    match value {
                        Value::String(text) => line.push_str(&escape_kv(text)),
                        other => line.push_str(&escape_kv(&other.to_string())),
                    }
                    separator = ' ';
                }
                Ok(line)
            }
        }
    }
}

/// Backslash-escapes the characters that would split a key-value line.
fn escape_kv(text: &str) -> Cow<'_, str> {
    if !text.contains(['\\', '\n', '\r', '\t']) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    Cow::Owned(escaped)
}

/// Writes records to stdout, one line each.
pub struct StdoutSink {
    format: OutputFormat,
    out: Mutex<Stdout>,
}

impl StdoutSink {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            out: Mutex::new(tokio::io::stdout()),
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

impl RecordSink for StdoutSink {
    fn emit(&self, record: Record) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut line = self.format.render(&record)?;
            line.push('\n');
            let mut out = self.out.lock().await;
            out.write_all(line.as_bytes())
                .await
                .context("failed to write record to stdout")?;
            out.flush().await.context("failed to flush stdout")
        })
    }
}

/// Forwards records into an unbounded channel for embedding hosts.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Record>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Record>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl RecordSink for ChannelSink {
    fn emit(&self, record: Record) -> BoxFuture<'_, Result<()>> {
        let outcome = self
            .tx
            .send(record)
            .map_err(|_| anyhow!("record channel closed"));
        Box::pin(async move { outcome })
    }
}
