//! Per-backend circuit breaking
//!
//! A backend that failed is reported unavailable until `retry_delay` has
//! elapsed since its most recent failure. There is no manual reset; the
//! breaker recovers on its own. Availability is advisory: the fan-out
//! policy decides whether to skip an unavailable backend.

use crate::metrics;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

/// Sentinel for "never failed"
const NEVER_FAILED: u64 = 0;

/// A remote backend and its health state
///
/// The failure timestamp is one atomic; concurrent failures race and the
/// last write wins, which is fine because any recent failure is enough to
/// open the breaker.
pub struct RemoteBackend {
    /// Network address, e.g. `10.0.0.5:8080`
    address: String,

    /// Cooldown after a failure
    retry_delay: Duration,

    /// Reference point for the stored timestamp
    origin: Instant,

    /// Nanoseconds since `origin` of the last failure, plus one; 0 = never
    last_failure_ns: AtomicU64,
}

impl RemoteBackend {
    /// Create a backend that has never failed
    pub fn new(address: impl Into<String>, retry_delay: Duration) -> Self {
        Self {
            address: address.into(),
            retry_delay,
            origin: Instant::now(),
            last_failure_ns: AtomicU64::new(NEVER_FAILED),
        }
    }

    /// Backend address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Configured cooldown
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Record a failure now
    pub fn fail(&self) {
        // Unrounded, so availability never returns before retry_delay
        let now_ns = self.origin.elapsed().as_nanos() as u64;
        self.last_failure_ns.store(now_ns + 1, Ordering::Release);

        metrics::record_backend_failure(&self.address);
        warn!(
            backend = %self.address,
            retry_delay_secs = self.retry_delay.as_secs(),
            "Remote backend marked as failed"
        );
    }

    /// Time of the most recent failure, if any
    pub fn last_failure(&self) -> Option<Instant> {
        match self.last_failure_ns.load(Ordering::Acquire) {
            NEVER_FAILED => None,
            stored => Some(self.origin + Duration::from_nanos(stored - 1)),
        }
    }

    /// True once more than `retry_delay` has passed since the last failure
    pub fn is_available(&self) -> bool {
        match self.last_failure() {
            None => true,
            Some(failed_at) => failed_at.elapsed() > self.retry_delay,
        }
    }
}

impl fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBackend")
            .field("address", &self.address)
            .field("available", &self.is_available())
            .finish()
    }
}

impl fmt::Display for RemoteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}
