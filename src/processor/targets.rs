//! Per-cycle resolution of the (group, stream) pairs to poll.
//!
//! Resolution is repeated every cycle rather than cached, so groups and
//! streams created while the tailer runs are picked up on the next pass.

use crate::runtime::config::TailerConfig;
use crate::source::{LogSource, Target};
use anyhow::{Context, Result};

#[derive(Debug, Clone, Default)]
pub struct TargetResolver {
    group: Option<String>,
    stream: Option<String>,
    stream_prefix: Option<String>,
}

impl TargetResolver {
    pub fn new(group: Option<String>, stream: Option<String>) -> Self {
        Self {
            group,
            stream,
            stream_prefix: None,
        }
    }

    pub fn from_config(config: &TailerConfig) -> Self {
        Self {
            group: config.group().map(str::to_owned),
            stream: config.stream().map(str::to_owned),
            stream_prefix: config.stream_prefix().map(str::to_owned),
        }
    }

    pub fn with_stream_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.stream_prefix = Some(prefix.into());
        self
    }

    pub async fn resolve(&self, source: &dyn LogSource) -> Result<Vec<Target>> {
        match (&self.group, &self.stream) {
            (Some(group), Some(stream)) => Ok(vec![Target::new(group.clone(), stream.clone())]),
            (Some(group), None) => self.streams_of(source, group).await,
            (None, _) => {
                let groups = source
                    .list_groups()
                    .await
                    .context("failed to list log groups")?;
                let mut targets = Vec::new();
                for group in &groups {
                    targets.extend(self.streams_of(source, group).await?);
                }
                tracing::debug!(
                    groups = groups.len(),
                    targets = targets.len(),
                    "resolved targets across all groups"
                );
                Ok(targets)
            }
        }
    }

    async fn streams_of(&self, source: &dyn LogSource, group: &str) -> Result<Vec<Target>> {
        let streams = source
            .list_streams(group)
            .await
            .with_context(|| format!("failed to list streams of group {group}"))?;

        Ok(streams
            .into_iter()
            .filter(|stream| self.accepts(stream))
            .map(|stream| Target::new(group, stream))
            .collect())
    }

    fn accepts(&self, stream: &str) -> bool {
        if let Some(fixed) = &self.stream {
            return stream == fixed;
        }
        match &self.stream_prefix {
            Some(prefix) => stream.starts_with(prefix.as_str()),
            None => true,
        }
    }
}
