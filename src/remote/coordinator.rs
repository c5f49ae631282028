//! Request coordination for coalesced bulk fetches
//!
//! Many leaf readers produced by one find share a single bulk render
//! request. The coordinator tracks, per [`FetchKey`], the synchronization
//! state that elects one sender and one resolving waiter, plus the
//! published results every other reader copies its series from.
//!
//! # Synchronization
//!
//! ```text
//! map lock (parking_lot::Mutex)   guards records + results, never held across .await
//! record.sender  (Permit)         first claimant dispatches the request
//! record.waiter  (Permit)         first claimant awaits the dispatch task
//! record.completion (watch)       fired once the request finished, either way
//! ```
//!
//! Records are never reset. Memory is bounded by age-based sweeps that run
//! once the map reaches its size limit.

use crate::config::RemoteConfig;
use crate::error::RemoteResult;
use crate::metrics;
use crate::types::BulkResult;

use super::transport::TransportRequest;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Identity of one physical bulk request: the full render URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey(String);

impl FetchKey {
    /// Derive the key for `request` sent to `address`
    pub fn new(address: &str, request: &TransportRequest) -> Self {
        FetchKey(request.url(address))
    }

    /// Key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permit state, stored in an `AtomicU8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum PermitState {
    Unclaimed = 0,
    Claimed = 1,
}

/// One-shot mutually exclusive claim
///
/// `try_claim` never blocks, so the same code works on a multi-threaded
/// runtime and on a single-threaded one where it is just a flag check.
#[derive(Debug)]
pub struct Permit {
    state: AtomicU8,
}

impl Permit {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(PermitState::Unclaimed as u8),
        }
    }

    /// Claim the permit; true for exactly one caller
    pub fn try_claim(&self) -> bool {
        self.state
            .compare_exchange(
                PermitState::Unclaimed as u8,
                PermitState::Claimed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// True once someone holds the permit
    pub fn is_claimed(&self) -> bool {
        self.state.load(Ordering::Acquire) == PermitState::Claimed as u8
    }
}

/// Single-fire completion signal
#[derive(Debug)]
pub struct CompletionSignal {
    tx: watch::Sender<bool>,
}

impl CompletionSignal {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal; later calls are no-ops
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    /// True once fired
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait up to `timeout` for the signal; false if it timed out
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        let fired = async move {
            loop {
                let fired = *rx.borrow_and_update();
                if fired {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        };
        tokio::time::timeout(timeout, fired).await.unwrap_or(false)
    }
}

/// Handle to the spawned task that performs one bulk request
pub(crate) type DispatchHandle = JoinHandle<RemoteResult<Arc<BulkResult>>>;

/// Per-key synchronization state
pub struct CoordinationRecord {
    sender: Permit,
    waiter: Permit,
    completion: CompletionSignal,
    in_flight: Mutex<Option<DispatchHandle>>,
    created_at: Instant,
}

impl CoordinationRecord {
    fn new() -> Self {
        Self {
            sender: Permit::new(),
            waiter: Permit::new(),
            completion: CompletionSignal::new(),
            in_flight: Mutex::new(None),
            created_at: Instant::now(),
        }
    }

    /// Permit of the caller that dispatches the request
    pub fn sender(&self) -> &Permit {
        &self.sender
    }

    /// Permit of the caller that awaits the dispatch
    pub fn waiter(&self) -> &Permit {
        &self.waiter
    }

    /// Fired when the request finished
    pub fn completion(&self) -> &CompletionSignal {
        &self.completion
    }

    /// Time since the record was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn set_in_flight(&self, handle: DispatchHandle) {
        *self.in_flight.lock() = Some(handle);
    }

    pub(crate) fn take_in_flight(&self) -> Option<DispatchHandle> {
        self.in_flight.lock().take()
    }
}

impl fmt::Debug for CoordinationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinationRecord")
            .field("sender_claimed", &self.sender.is_claimed())
            .field("waiter_claimed", &self.waiter.is_claimed())
            .field("completed", &self.completion.is_fired())
            .field("age", &self.age())
            .finish()
    }
}

#[derive(Default)]
struct CoordinatorState {
    records: HashMap<FetchKey, Arc<CoordinationRecord>>,
    results: HashMap<FetchKey, Arc<BulkResult>>,
}

/// Shared coordinator for coalesced bulk fetches
///
/// Owned explicitly and passed around in an `Arc`; independent instances
/// do not share state.
pub struct RequestCoordinator {
    state: Mutex<CoordinatorState>,
    fetch_timeout: Duration,
    size_limit: usize,
}

impl RequestCoordinator {
    /// Create a coordinator
    ///
    /// # Arguments
    ///
    /// * `fetch_timeout` - Bound for coalesced waits; entries older than twice
    ///   this are evictable
    /// * `size_limit` - Number of tracked keys at which sweeps start
    pub fn new(fetch_timeout: Duration, size_limit: usize) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::default()),
            fetch_timeout,
            size_limit,
        }
    }

    /// Create a coordinator from configuration
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self::new(config.fetch_timeout(), config.reader_cache_size_limit)
    }

    /// Bound for coalesced waits
    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }

    /// Get the record for `key`, creating it if absent
    ///
    /// Concurrent callers for the same new key all receive the same record.
    pub fn get_or_create(&self, key: &FetchKey) -> Arc<CoordinationRecord> {
        let mut state = self.state.lock();
        let record = Arc::clone(
            state
                .records
                .entry(key.clone())
                .or_insert_with(|| Arc::new(CoordinationRecord::new())),
        );
        metrics::update_coordinator_entries(state.records.len());
        record
    }

    /// Sweep old entries once the size limit is reached
    ///
    /// Removes records created at least twice the fetch timeout ago together
    /// with their published results. Age is the only criterion. Returns the
    /// number of records removed.
    pub fn evict_if_needed(&self) -> usize {
        let mut state = self.state.lock();
        if state.records.len() < self.size_limit {
            return 0;
        }

        info!(
            entries = state.records.len(),
            limit = self.size_limit,
            "Clearing old entries from request coordinator"
        );

        let max_age = self.fetch_timeout * 2;
        let expired: Vec<FetchKey> = state
            .records
            .iter()
            .filter(|(_, record)| record.age() >= max_age)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.records.remove(key);
            state.results.remove(key);
        }

        metrics::update_coordinator_entries(state.records.len());
        metrics::record_evictions(expired.len());
        expired.len()
    }

    /// Published result for `key`, if any
    pub fn cached_result(&self, key: &FetchKey) -> Option<Arc<BulkResult>> {
        self.state.lock().results.get(key).cloned()
    }

    /// Publish the result of a completed request
    ///
    /// Results for keys that are no longer tracked are dropped, so a request
    /// outliving its record cannot grow the result cache. Returns whether the
    /// result was stored.
    pub fn publish(&self, key: &FetchKey, result: Arc<BulkResult>) -> bool {
        let mut state = self.state.lock();
        if !state.records.contains_key(key) {
            debug!(url = %key, "Dropping result for evicted fetch key");
            return false;
        }
        state.results.insert(key.clone(), result);
        true
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// True if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of published results
    pub fn result_count(&self) -> usize {
        self.state.lock().results.len()
    }

    /// Drop every record and result
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.records.clear();
        state.results.clear();
        metrics::update_coordinator_entries(0);
    }
}

impl fmt::Debug for RequestCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RequestCoordinator")
            .field("records", &state.records.len())
            .field("results", &state.results.len())
            .field("fetch_timeout", &self.fetch_timeout)
            .field("size_limit", &self.size_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(target: &str) -> FetchKey {
        let request =
            TransportRequest::render(target, 0, 60, "json", Duration::from_secs(1)).unwrap();
        FetchKey::new("h:80", &request)
    }

    #[test]
    fn test_permit_claims_once() {
        let permit = Permit::new();
        assert!(!permit.is_claimed());
        assert!(permit.try_claim());
        assert!(!permit.try_claim());
        assert!(permit.is_claimed());
    }

    #[test]
    fn test_get_or_create_returns_same_record() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(1), 100);
        let a = coordinator.get_or_create(&key("a"));
        let b = coordinator.get_or_create(&key("a"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(coordinator.len(), 1);
    }

    #[test]
    fn test_concurrent_get_or_create_shares_record() {
        let coordinator = Arc::new(RequestCoordinator::new(Duration::from_secs(1), 100));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                std::thread::spawn(move || coordinator.get_or_create(&key("shared")))
            })
            .collect();

        let records: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(records.iter().all(|r| Arc::ptr_eq(r, &records[0])));
        assert_eq!(records.iter().filter(|r| r.sender().try_claim()).count(), 1);
    }

    #[test]
    fn test_publish_requires_record() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(1), 100);
        assert!(!coordinator.publish(&key("a"), Arc::new(BulkResult::default())));
        coordinator.get_or_create(&key("a"));
        assert!(coordinator.publish(&key("a"), Arc::new(BulkResult::default())));
        assert!(coordinator.cached_result(&key("a")).is_some());
    }

    #[tokio::test]
    async fn test_completion_signal() {
        let signal = CompletionSignal::new();
        assert!(!signal.wait(Duration::from_millis(10)).await);
        signal.fire();
        signal.fire();
        assert!(signal.is_fired());
        assert!(signal.wait(Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_is_age_based() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(5), 3);

        coordinator.get_or_create(&key("old-1"));
        coordinator.get_or_create(&key("old-2"));
        coordinator.publish(&key("old-1"), Arc::new(BulkResult::default()));

        tokio::time::advance(Duration::from_secs(10)).await;
        coordinator.get_or_create(&key("fresh"));

        assert_eq!(coordinator.evict_if_needed(), 2);
        assert_eq!(coordinator.len(), 1);
        assert!(coordinator.cached_result(&key("old-1")).is_none());
        assert_eq!(coordinator.result_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_eviction_below_limit() {
        let coordinator = RequestCoordinator::new(Duration::from_secs(5), 10);
        coordinator.get_or_create(&key("a"));
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(coordinator.evict_if_needed(), 0);
        assert_eq!(coordinator.len(), 1);
    }
}
