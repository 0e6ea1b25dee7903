pub mod checkpoint;
pub mod processor;
pub mod runtime;
pub mod source;

pub use checkpoint::{CheckpointError, CheckpointStore, CheckpointTable};
pub use processor::extractor::{ExtractionStats, RecordExtractor, TextParser};
pub use processor::fetcher::EventFetcher;
pub use processor::poller::{CycleSummary, PollSchedule, PollWorker, PollWorkerParams};
pub use processor::targets::TargetResolver;
pub use processor::watchdog::{Watchdog, WatchdogTiming, WorkerSpawner};
pub use runtime::config::{TailerConfig, TailerConfigBuilder};
pub use runtime::liveness::LivenessMarker;
pub use runtime::runner::Runner;
pub use runtime::sink::{ChannelSink, OutputFormat, Record, RecordSink, StdoutSink};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use source::{EventPage, JsonRpcLogSource, LogSource, RawEvent, SourceError, Target};
