//! Remote log-storage plumbing: the `LogSource` capability surface consumed by
//! the poller, plus a JSON-RPC client with auth headers, optional proxying, and call metrics.

pub mod auth;
pub mod client;
pub mod metrics;
pub mod options;
mod proxied;
pub mod types;

pub use client::{JsonRpcLogSource, SourceError};
pub use metrics::{CallStats, SourceMetricsSnapshot};
pub use options::SourceClientOptions;
pub use types::{EventPage, LogSource, RawEvent, Target};
