use crate::processor::extractor::ExtractionStats;
use crate::source::{LogSource, SourceMetricsSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(30);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Records go to stdout; keep diagnostics on stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters shared by the poll worker, the watchdog, and the reporter.
#[derive(Default, Debug)]
pub struct Telemetry {
    cycles_completed: AtomicU64,
    cycles_failed: AtomicU64,
    events_fetched: AtomicU64,
    records_emitted: AtomicU64,
    events_skipped: AtomicU64,
    worker_restarts: AtomicU64,
}

impl Telemetry {
    pub fn record_cycle_completed(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch(&self, stats: ExtractionStats) {
        if stats.total == 0 {
            return;
        }
        self.events_fetched.fetch_add(stats.total, Ordering::Relaxed);
        self.records_emitted
            .fetch_add(stats.emitted(), Ordering::Relaxed);
        self.events_skipped.fetch_add(stats.skipped, Ordering::Relaxed);
    }

    pub fn record_worker_restart(&self) {
        self.worker_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            events_fetched: self.events_fetched.load(Ordering::Relaxed),
            records_emitted: self.records_emitted.load(Ordering::Relaxed),
            events_skipped: self.events_skipped.load(Ordering::Relaxed),
            worker_restarts: self.worker_restarts.load(Ordering::Relaxed),
        }
    }

    pub fn records_emitted(&self) -> u64 {
        self.records_emitted.load(Ordering::Relaxed)
    }

    pub fn worker_restarts(&self) -> u64 {
        self.worker_restarts.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub events_fetched: u64,
    pub records_emitted: u64,
    pub events_skipped: u64,
    pub worker_restarts: u64,
}

/// Spawns a background task that periodically logs throughput and failure
/// counters, plus the source's call statistics when it keeps any.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    source: Arc<dyn LogSource>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "streamtail::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let emitted_delta = current
                        .records_emitted
                        .saturating_sub(last_snapshot.records_emitted);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        emitted_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "streamtail::metrics",
                        throughput = format!("{throughput:.2}"),
                        emitted = current.records_emitted,
                        fetched = current.events_fetched,
                        skipped = current.events_skipped,
                        cycles = current.cycles_completed,
                        failed_cycles = current.cycles_failed,
                        restarts = current.worker_restarts,
                        "runtime metrics snapshot"
                    );

                    if let Some(calls) = source.call_metrics() {
                        log_call_metrics(&calls);
                    }

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}

fn log_call_metrics(calls: &SourceMetricsSnapshot) {
    tracing::info!(
        target: "streamtail::metrics",
        listing_calls = calls.listing.calls,
        listing_errors = calls.listing.errors,
        listing_latency_ms = format!("{:.2}", calls.listing.average_latency_ms),
        fetch_calls = calls.fetch.calls,
        fetch_errors = calls.fetch.errors,
        fetch_timeouts = calls.fetch.timeouts,
        fetch_latency_ms = format!("{:.2}", calls.fetch.average_latency_ms),
        fetch_error_rate = format!("{:.3}", calls.fetch.error_rate()),
        "remote call metrics"
    );
}
