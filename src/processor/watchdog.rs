//! Liveness supervision of the poll worker.
//!
//! The watchdog wakes every half fetch interval and compares the liveness
//! marker against twice the fetch interval. A stalled worker is cancelled,
//! given `join_timeout` to wind down, aborted if it is still running, and
//! replaced by a fresh one. A worker can only be aborted at an `.await`, and
//! checkpoint writes never await, so a forced termination cannot interrupt a
//! checkpoint update.

use crate::runtime::config::TailerConfig;
use crate::runtime::liveness::LivenessMarker;
use crate::runtime::telemetry::Telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Spawns one poll worker bound to the given cancellation token.
pub type WorkerSpawner = Arc<dyn Fn(CancellationToken) -> JoinHandle<()> + Send + Sync>;

/// How often to check, how long an idle worker is tolerated, and how long a
/// cancelled worker gets before it is aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogTiming {
    pub period: Duration,
    pub threshold: Duration,
    pub join_timeout: Duration,
}

impl WatchdogTiming {
    pub fn from_config(config: &TailerConfig) -> Self {
        Self {
            period: config.watchdog_period(),
            threshold: config.stall_threshold(),
            join_timeout: config.tick(),
        }
    }
}

struct SupervisedWorker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Watchdog {
    liveness: Arc<LivenessMarker>,
    telemetry: Arc<Telemetry>,
    period: Duration,
    threshold: Duration,
    join_timeout: Duration,
    spawn: WorkerSpawner,
}

impl Watchdog {
    pub fn new(
        liveness: Arc<LivenessMarker>,
        telemetry: Arc<Telemetry>,
        timing: WatchdogTiming,
        spawn: WorkerSpawner,
    ) -> Self {
        Self {
            liveness,
            telemetry,
            period: timing.period,
            threshold: timing.threshold,
            join_timeout: timing.join_timeout,
            spawn,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Runs the worker under supervision until `shutdown` is cancelled, then
    /// waits for the current worker to finish its cycle.
    pub async fn supervise(self, shutdown: CancellationToken) {
        let period = self.period();
        let mut worker = self.start_worker(&shutdown);
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            period_ms = period.as_millis() as u64,
            threshold_ms = self.threshold().as_millis() as u64,
            "watchdog started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(idle) = self
                        .liveness
                        .check_stalled(Instant::now(), self.threshold())
                    else {
                        continue;
                    };

                    tracing::warn!(
                        idle_ms = idle.as_millis() as u64,
                        threshold_ms = self.threshold().as_millis() as u64,
                        "poll worker stalled; restarting"
                    );
                    self.terminate(worker).await;
                    self.telemetry.record_worker_restart();
                    worker = self.start_worker(&shutdown);
                }
            }
        }

        worker.token.cancel();
        if let Err(err) = worker.handle.await {
            if !err.is_cancelled() {
                tracing::warn!(error = %err, "poll worker task panicked");
            }
        }
        tracing::info!("watchdog stopped");
    }

    fn start_worker(&self, shutdown: &CancellationToken) -> SupervisedWorker {
        let token = shutdown.child_token();
        let handle = (self.spawn)(token.clone());
        SupervisedWorker { token, handle }
    }

    async fn terminate(&self, worker: SupervisedWorker) {
        let SupervisedWorker { token, mut handle } = worker;
        token.cancel();

        match time::timeout(self.join_timeout, &mut handle).await {
            Ok(Ok(())) => tracing::debug!("stalled worker exited after cancellation"),
            Ok(Err(err)) if err.is_panic() => {
                tracing::warn!(error = %err, "stalled worker had panicked")
            }
            Ok(Err(_)) => {}
            Err(_) => {
                handle.abort();
                let _ = handle.await;
                tracing::warn!(
                    join_timeout_ms = self.join_timeout.as_millis() as u64,
                    "stalled worker ignored cancellation; aborted"
                );
            }
        }
    }
}
