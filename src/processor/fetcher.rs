//! Incremental fetch for one target, driven by the persisted continuation token.

use crate::checkpoint::CheckpointStore;
use crate::source::{LogSource, RawEvent, Target};
use anyhow::{Context, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct EventFetcher {
    source: Arc<dyn LogSource>,
    checkpoints: CheckpointStore,
}

impl EventFetcher {
    pub fn new(source: Arc<dyn LogSource>, checkpoints: CheckpointStore) -> Self {
        Self {
            source,
            checkpoints,
        }
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Fetches everything after the stored token and persists the returned
    /// token, even when the page is empty. Remote failures are not retried.
    pub async fn fetch(&self, target: &Target) -> Result<Vec<RawEvent>> {
        let token = self
            .checkpoints
            .get_token(target)
            .with_context(|| format!("failed to read checkpoint for {target}"))?;

        let page = self
            .source
            .fetch_events(target, token.as_deref())
            .await
            .with_context(|| format!("failed to fetch events for {target}"))?;

        self.checkpoints
            .put_token(target, &page.next_token)
            .with_context(|| format!("failed to store checkpoint for {target}"))?;

        tracing::debug!(
            group = target.group(),
            stream = target.stream(),
            events = page.events.len(),
            resumed = token.is_some(),
            "fetched events"
        );

        Ok(page.events)
    }
}
