use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use streamtail::Record;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Collects exactly `count` records, failing once `limit` has elapsed.
pub async fn collect_records(
    records: &mut UnboundedReceiver<Record>,
    count: usize,
    limit: Duration,
) -> Result<Vec<Record>> {
    let deadline = Instant::now() + limit;
    let mut collected = Vec::with_capacity(count);

    while collected.len() < count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, records.recv()).await {
            Ok(Some(record)) => collected.push(record),
            Ok(None) => bail!("record channel closed after {} records", collected.len()),
            Err(_) => bail!(
                "timed out waiting for {count} records; received {}",
                collected.len()
            ),
        }
    }

    Ok(collected)
}

pub fn message_of(record: &Record) -> Option<&str> {
    record.fields.get("message").and_then(|value| value.as_str())
}
