//! Runtime glue that wires configuration, liveness tracking, sinks, telemetry,
//! and runner orchestration.

pub mod config;
pub mod liveness;
pub mod runner;
pub mod sink;
pub mod telemetry;
