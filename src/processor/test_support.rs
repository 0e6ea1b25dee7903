//! In-memory [`LogSource`] used by the processor unit tests.

use crate::source::{EventPage, LogSource, RawEvent, Target};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FetchCall {
    pub target: Target,
    pub token: Option<String>,
}

/// Streams hold an append-only event log; tokens are `pos-<index>`.
#[derive(Default)]
pub(crate) struct StaticLogSource {
    groups: Mutex<BTreeMap<String, BTreeMap<String, Vec<RawEvent>>>>,
    fetches: Mutex<Vec<FetchCall>>,
    fail_fetches: AtomicBool,
    fail_listing: AtomicBool,
}

impl StaticLogSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_stream(self, group: &str, stream: &str) -> Self {
        self.groups
            .lock()
            .unwrap()
            .entry(group.to_owned())
            .or_default()
            .entry(stream.to_owned())
            .or_default();
        self
    }

    pub(crate) fn push(&self, group: &str, stream: &str, event: RawEvent) {
        self.groups
            .lock()
            .unwrap()
            .entry(group.to_owned())
            .or_default()
            .entry(stream.to_owned())
            .or_default()
            .push(event);
    }

    pub(crate) fn fetches(&self) -> Vec<FetchCall> {
        self.fetches.lock().unwrap().clone()
    }

    pub(crate) fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    fn page(&self, target: &Target, token: Option<&str>) -> Result<EventPage> {
        let start = match token {
            Some(token) => token
                .strip_prefix("pos-")
                .and_then(|pos| pos.parse::<usize>().ok())
                .ok_or_else(|| anyhow!("invalid token {token}"))?,
            None => 0,
        };
        let groups = self.groups.lock().unwrap();
        let events = groups
            .get(target.group())
            .and_then(|streams| streams.get(target.stream()))
            .ok_or_else(|| anyhow!("unknown target {target}"))?;
        let start = start.min(events.len());
        Ok(EventPage {
            events: events[start..].to_vec(),
            next_token: format!("pos-{}", events.len()),
        })
    }
}

impl LogSource for StaticLogSource {
    fn list_groups(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        let outcome = if self.fail_listing.load(Ordering::SeqCst) {
            Err(anyhow!("listGroups unavailable"))
        } else {
            Ok(self.groups.lock().unwrap().keys().cloned().collect())
        };
        Box::pin(async move { outcome })
    }

    fn list_streams<'a>(&'a self, group: &'a str) -> BoxFuture<'a, Result<Vec<String>>> {
        let outcome = if self.fail_listing.load(Ordering::SeqCst) {
            Err(anyhow!("listStreams unavailable"))
        } else {
            self.groups
                .lock()
                .unwrap()
                .get(group)
                .map(|streams| streams.keys().cloned().collect())
                .ok_or_else(|| anyhow!("unknown group {group}"))
        };
        Box::pin(async move { outcome })
    }

    fn fetch_events<'a>(
        &'a self,
        target: &'a Target,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<EventPage>> {
        self.fetches.lock().unwrap().push(FetchCall {
            target: target.clone(),
            token: token.map(str::to_owned),
        });
        let outcome = if self.fail_fetches.load(Ordering::SeqCst) {
            Err(anyhow!("fetchEvents unavailable"))
        } else {
            self.page(target, token)
        };
        Box::pin(async move { outcome })
    }
}
