use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Timestamp of the poll worker's last completed fetch-and-emit step.
///
/// The worker writes it after every target batch. The watchdog reads it and,
/// when it declares a stall, resets it under the same lock so a freshly spawned
/// worker gets a full grace period.
#[derive(Debug)]
pub struct LivenessMarker {
    last_progress: Mutex<Instant>,
}

impl Default for LivenessMarker {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessMarker {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(instant: Instant) -> Self {
        Self {
            last_progress: Mutex::new(instant),
        }
    }

    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    pub fn touch_at(&self, instant: Instant) {
        *self.guard() = instant;
    }

    pub fn last_progress(&self) -> Instant {
        *self.guard()
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_progress())
    }

    /// Returns the idle time when it exceeds `threshold`, resetting the marker
    /// to `now` in the same critical section.
    pub fn check_stalled(&self, now: Instant, threshold: Duration) -> Option<Duration> {
        let mut last = self.guard();
        let idle = now.saturating_duration_since(*last);
        if idle > threshold {
            *last = now;
            Some(idle)
        } else {
            None
        }
    }

    fn guard(&self) -> MutexGuard<'_, Instant> {
        self.last_progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
