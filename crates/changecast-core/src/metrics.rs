//! Router counters for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Router metrics, updated lock-free on the routing path.
#[derive(Debug)]
pub struct RouterMetrics {
    /// Events that were routed without error.
    pub events_routed: AtomicU64,
    /// Change broadcasts delivered to the transport.
    pub changes_sent: AtomicU64,
    /// Error broadcasts delivered to the transport.
    pub errors_sent: AtomicU64,
    /// Group sends the transport rejected.
    pub send_failures: AtomicU64,
    /// Events rejected for carrying no identity.
    pub malformed_events: AtomicU64,
    /// Creation time.
    pub started_at: Instant,
}

impl RouterMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            events_routed: AtomicU64::new(0),
            changes_sent: AtomicU64::new(0),
            errors_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            malformed_events: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub(crate) fn record_routed(&self) {
        self.events_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self, is_error: bool) {
        if is_error {
            self.errors_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.changes_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.malformed_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the uptime duration.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Get the number of routed events.
    pub fn routed_events(&self) -> u64 {
        self.events_routed.load(Ordering::Relaxed)
    }

    /// Get the number of change broadcasts sent.
    pub fn sent_changes(&self) -> u64 {
        self.changes_sent.load(Ordering::Relaxed)
    }

    /// Get the number of error broadcasts sent.
    pub fn sent_errors(&self) -> u64 {
        self.errors_sent.load(Ordering::Relaxed)
    }

    /// Get the number of failed sends.
    pub fn failed_sends(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    /// Get the number of rejected events.
    pub fn rejected_events(&self) -> u64 {
        self.malformed_events.load(Ordering::Relaxed)
    }
}

impl Default for RouterMetrics {
    fn default() -> Self {
        Self::new()
    }
}
