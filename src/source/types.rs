use crate::source::metrics::SourceMetricsSnapshot;
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One remote (group, stream) pair polled by the tailer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    group: String,
    stream: String,
}

impl Target {
    pub fn new(group: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            stream: stream.into(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.stream)
    }
}

/// Event exactly as returned by the remote API. Never mutated after fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "timestamp")]
    pub timestamp_millis: i64,
    pub message: String,
}

impl RawEvent {
    pub fn new(timestamp_millis: i64, message: impl Into<String>) -> Self {
        Self {
            timestamp_millis,
            message: message.into(),
        }
    }
}

/// Response of one incremental fetch: the events plus the forward token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    #[serde(default)]
    pub events: Vec<RawEvent>,
    pub next_token: String,
}

/// Capability surface of the remote log-storage service.
///
/// Implementations own their transport, auth, and any retry policy. The poller
/// treats every call as a single fallible operation.
pub trait LogSource: Send + Sync {
    fn list_groups(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    fn list_streams<'a>(&'a self, group: &'a str) -> BoxFuture<'a, Result<Vec<String>>>;

    fn fetch_events<'a>(
        &'a self,
        target: &'a Target,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<EventPage>>;

    /// Transport call statistics, for sources that keep them.
    fn call_metrics(&self) -> Option<SourceMetricsSnapshot> {
        None
    }
}
