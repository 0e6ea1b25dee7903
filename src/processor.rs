//! The tailing pipeline: target resolution, incremental fetch, record
//! extraction, the fixed-cadence poll worker, and its watchdog.

pub mod extractor;
pub mod fetcher;
pub mod poller;
pub mod targets;
pub mod watchdog;

#[cfg(test)]
pub(crate) mod test_support;
