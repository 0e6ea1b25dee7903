//! The poll worker: resolve targets, fetch, extract, emit, mark liveness, on a
//! fixed wall-clock cadence.

use super::extractor::{ExtractionStats, RecordExtractor};
use super::fetcher::EventFetcher;
use super::targets::TargetResolver;
use crate::runtime::liveness::LivenessMarker;
use crate::runtime::sink::RecordSink;
use crate::runtime::telemetry::Telemetry;
use crate::source::{LogSource, Target};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Fixed-cadence schedule. Each due cycle advances the next fetch time by
/// exactly one interval from its previous value, so a slow cycle is followed
/// by an immediate catch-up rather than a permanently shifted cadence.
#[derive(Debug, Clone, Copy)]
pub struct PollSchedule {
    next_fetch: Instant,
    interval: Duration,
}

impl PollSchedule {
    /// The first cycle is due at `now`.
    pub fn starting_at(now: Instant, interval: Duration) -> Self {
        Self {
            next_fetch: now,
            interval,
        }
    }

    pub fn next_fetch(&self) -> Instant {
        self.next_fetch
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` and advances the schedule when a cycle is due at `now`.
    pub fn poll_due(&mut self, now: Instant) -> bool {
        if now < self.next_fetch {
            return false;
        }
        self.next_fetch += self.interval;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Running,
    Stopped,
}

/// Totals of one full pass over the resolved targets.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub targets: usize,
    pub events: u64,
    pub emitted: u64,
    pub skipped: u64,
}

#[derive(Clone)]
pub struct PollWorker {
    source: Arc<dyn LogSource>,
    resolver: TargetResolver,
    fetcher: EventFetcher,
    extractor: RecordExtractor,
    sink: Arc<dyn RecordSink>,
    liveness: Arc<LivenessMarker>,
    telemetry: Arc<Telemetry>,
    interval: Duration,
    tick: Duration,
}

pub struct PollWorkerParams {
    pub source: Arc<dyn LogSource>,
    pub resolver: TargetResolver,
    pub fetcher: EventFetcher,
    pub extractor: RecordExtractor,
    pub sink: Arc<dyn RecordSink>,
    pub liveness: Arc<LivenessMarker>,
    pub telemetry: Arc<Telemetry>,
    pub interval: Duration,
    pub tick: Duration,
}

impl PollWorker {
    pub fn new(params: PollWorkerParams) -> Self {
        let PollWorkerParams {
            source,
            resolver,
            fetcher,
            extractor,
            sink,
            liveness,
            telemetry,
            interval,
            tick,
        } = params;

        Self {
            source,
            resolver,
            fetcher,
            extractor,
            sink,
            liveness,
            telemetry,
            interval,
            tick,
        }
    }

    /// Runs until `shutdown` is cancelled. Cancellation is only observed
    /// between cycles; an in-flight cycle always runs to completion.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut schedule = PollSchedule::starting_at(Instant::now(), self.interval);
        let mut state = PollState::Running;

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            tag = self.extractor.tag(),
            "poll worker started"
        );

        while state == PollState::Running {
            if shutdown.is_cancelled() {
                state = PollState::Stopped;
                continue;
            }

            if schedule.poll_due(Instant::now()) {
                match self.run_cycle().await {
                    Ok(summary) => {
                        self.telemetry.record_cycle_completed();
                        tracing::debug!(
                            targets = summary.targets,
                            events = summary.events,
                            emitted = summary.emitted,
                            skipped = summary.skipped,
                            "poll cycle completed"
                        );
                    }
                    Err(err) => {
                        self.telemetry.record_cycle_failed();
                        tracing::error!(error = format!("{err:#}"), "poll cycle failed; retrying next interval");
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => state = PollState::Stopped,
                _ = sleep(self.tick) => {}
            }
        }

        tracing::info!("poll worker stopped");
    }

    /// One pass over every resolved target, strictly in sequence.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let targets = self
            .resolver
            .resolve(self.source.as_ref())
            .await
            .context("failed to resolve targets")?;

        if targets.is_empty() {
            // Nothing to poll is still a completed pass.
            self.liveness.touch();
        }

        let mut summary = CycleSummary {
            targets: targets.len(),
            ..CycleSummary::default()
        };

        for target in &targets {
            let stats = self.poll_target(target).await?;
            summary.events += stats.total;
            summary.emitted += stats.emitted();
            summary.skipped += stats.skipped;
            self.liveness.touch();
        }

        Ok(summary)
    }

    async fn poll_target(&self, target: &Target) -> Result<ExtractionStats> {
        let events = self.fetcher.fetch(target).await?;
        let mut stats = ExtractionStats::default();

        for event in &events {
            if let Some(record) = self.extractor.extract(event, &mut stats) {
                self.sink
                    .emit(record)
                    .await
                    .with_context(|| format!("failed to emit record for {target}"))?;
            }
        }

        self.telemetry.record_batch(stats);
        if stats.skipped > 0 {
            tracing::info!(
                group = target.group(),
                stream = target.stream(),
                skipped = stats.skipped,
                total = stats.total,
                "skipped events that could not be extracted"
            );
        }

        Ok(stats)
    }
}
