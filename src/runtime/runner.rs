use crate::checkpoint::CheckpointStore;
use crate::processor::extractor::{RecordExtractor, TextParser};
use crate::processor::fetcher::EventFetcher;
use crate::processor::poller::{PollWorker, PollWorkerParams};
use crate::processor::targets::TargetResolver;
use crate::processor::watchdog::{Watchdog, WatchdogTiming, WorkerSpawner};
use crate::runtime::config::TailerConfig;
use crate::runtime::liveness::LivenessMarker;
use crate::runtime::sink::RecordSink;
use crate::runtime::telemetry::{self, Telemetry};
use crate::source::LogSource;
use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Coordinates the supervised poll worker and handles OS signals for graceful shutdowns.
pub struct Runner {
    config: TailerConfig,
    source: Arc<dyn LogSource>,
    sink: Arc<dyn RecordSink>,
    parser: Option<Arc<dyn TextParser>>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    watchdog_handle: Option<JoinHandle<()>>,
    metrics_handle: Option<JoinHandle<()>>,
}

impl Runner {
    pub fn new(config: TailerConfig, source: Arc<dyn LogSource>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            config,
            source,
            sink,
            parser: None,
            telemetry: Arc::new(Telemetry::default()),
            shutdown: CancellationToken::new(),
            watchdog_handle: None,
            metrics_handle: None,
        }
    }

    /// Routes every raw message through `parser` instead of the built-in
    /// JSON-span extraction.
    pub fn with_parser(mut self, parser: Arc<dyn TextParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn is_running(&self) -> bool {
        self.watchdog_handle.is_some()
    }

    /// Spawns the watchdog (which owns the poll worker) and the metrics reporter.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        self.config.validate()?;

        let liveness = Arc::new(LivenessMarker::new());
        let worker = self.build_worker(liveness.clone());
        let spawn: WorkerSpawner =
            Arc::new(move |token: CancellationToken| tokio::spawn(worker.clone().run(token)));
        let watchdog = Watchdog::new(
            liveness,
            self.telemetry.clone(),
            WatchdogTiming::from_config(&self.config),
            spawn,
        );

        tracing::info!(
            endpoint = self.config.endpoint(),
            tag = self.config.tag(),
            checkpoint = %self.config.checkpoint_path().display(),
            interval_ms = self.config.fetch_interval().as_millis() as u64,
            "starting tailer"
        );

        self.watchdog_handle = Some(tokio::spawn(watchdog.supervise(self.shutdown.clone())));
        self.metrics_handle = Some(telemetry::spawn_metrics_reporter(
            self.telemetry.clone(),
            self.source.clone(),
            self.shutdown.clone(),
            self.config.metrics_interval(),
        ));
        Ok(())
    }

    /// Stops gracefully: the worker finishes its in-flight cycle before the
    /// watchdog returns.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.is_running() {
            return Ok(());
        }

        self.shutdown.cancel();
        self.join_tasks().await;
        self.reinitialize_shutdown_token();
        Ok(())
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.stop().await
    }

    fn build_worker(&self, liveness: Arc<LivenessMarker>) -> PollWorker {
        let checkpoints = CheckpointStore::new(self.config.checkpoint_path());
        let mut extractor = RecordExtractor::new(self.config.tag());
        if let Some(parser) = &self.parser {
            extractor = extractor.with_parser(parser.clone());
        }

        PollWorker::new(PollWorkerParams {
            source: self.source.clone(),
            resolver: TargetResolver::from_config(&self.config),
            fetcher: EventFetcher::new(self.source.clone(), checkpoints),
            extractor,
            sink: self.sink.clone(),
            liveness,
            telemetry: self.telemetry.clone(),
            interval: self.config.fetch_interval(),
            tick: self.config.tick(),
        })
    }

    async fn join_tasks(&mut self) {
        if let Some(handle) = self.watchdog_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "watchdog task panicked");
            }
        }

        if let Some(handle) = self.metrics_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task panicked");
            }
        }
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
    }
}
