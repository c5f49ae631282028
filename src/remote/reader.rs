//! Remote leaf reader
//!
//! A [`SeriesFetcher`] reads one leaf's data out of a bulk render request
//! for the pattern the leaf was found with. Every leaf from one find shares
//! that bulk request, so `fetch` for N leaves over the same window issues a
//! single network call:
//!
//! 1. A published result for the fetch key answers immediately.
//! 2. Otherwise the first caller to claim the sender permit dispatches the
//!    request as a background task; everyone else joins it.
//! 3. Each caller gets a [`DeferredResult`]. When forced, the first to claim
//!    the waiter permit awaits the dispatch task and sees its error, if any;
//!    the rest wait on the completion signal and read the published result.
//!
//! # Retrying after a failure
//!
//! Coordination records are never reset. Once the bulk request for a key
//! has failed, its sender permit stays claimed and no result is published,
//! so fetching the same window again resolves to
//! [`CoalescedFetchMissing`](crate::error::RemoteError::CoalescedFetchMissing)
//! without sending anything. The key becomes fetchable again only after an
//! eviction sweep removes it, which happens once the coordinator holds
//! `reader_cache_size_limit` keys and the record is at least twice the
//! fetch timeout old. Callers retrying sooner must use a different window.

use crate::error::{RemoteError, RemoteResult};
use crate::metrics;
use crate::types::{BulkResult, IntervalSet, SeriesData};

use super::coordinator::{CoordinationRecord, DispatchHandle, FetchKey, RequestCoordinator};
use super::deferred::DeferredResult;
use super::health::RemoteBackend;
use super::transport::{Transport, TransportRequest, WireFormat};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Collaborators shared by every reader of a lookup
#[derive(Clone)]
pub struct FetchContext {
    transport: Arc<dyn Transport>,
    format: Arc<dyn WireFormat>,
    coordinator: Arc<RequestCoordinator>,
}

impl FetchContext {
    /// Bundle the transport, wire format and coordinator
    pub fn new(
        transport: Arc<dyn Transport>,
        format: Arc<dyn WireFormat>,
        coordinator: Arc<RequestCoordinator>,
    ) -> Self {
        Self {
            transport,
            format,
            coordinator,
        }
    }

    /// Transport used for requests
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Wire format used for requests
    pub fn format(&self) -> &Arc<dyn WireFormat> {
        &self.format
    }

    /// Shared coordinator
    pub fn coordinator(&self) -> &Arc<RequestCoordinator> {
        &self.coordinator
    }
}

impl fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("format", &self.format.id())
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

/// Outcome of [`SeriesFetcher::fetch`]
#[derive(Debug)]
pub enum FetchOutcome {
    /// Served from an already published result
    Ready(SeriesData),
    /// Needs forcing; may wait on a network request
    Deferred(DeferredResult<Option<SeriesData>>),
}

impl FetchOutcome {
    /// True if no waiting is needed
    pub fn is_ready(&self) -> bool {
        matches!(self, FetchOutcome::Ready(_))
    }

    /// Resolve to the leaf's data
    ///
    /// `Ok(None)` means the backend answered without this series.
    pub async fn resolve(self) -> RemoteResult<Option<SeriesData>> {
        match self {
            FetchOutcome::Ready(data) => Ok(Some(data)),
            FetchOutcome::Deferred(deferred) => deferred.force().await,
        }
    }
}

/// Reader for one remote leaf
#[derive(Clone)]
pub struct SeriesFetcher {
    backend: Arc<RemoteBackend>,
    context: FetchContext,
    path: String,
    intervals: IntervalSet,
    bulk_query: String,
}

impl SeriesFetcher {
    /// Create a reader
    ///
    /// `bulk_query` is the pattern of the find that produced the leaf; when
    /// absent the leaf path itself is fetched.
    pub fn new(
        backend: Arc<RemoteBackend>,
        context: FetchContext,
        path: impl Into<String>,
        intervals: IntervalSet,
        bulk_query: Option<String>,
    ) -> Self {
        let path = path.into();
        let bulk_query = bulk_query.unwrap_or_else(|| path.clone());
        Self {
            backend,
            context,
            path,
            intervals,
            bulk_query,
        }
    }

    /// Leaf path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Known coverage of the leaf
    pub fn intervals(&self) -> &IntervalSet {
        &self.intervals
    }

    /// Pattern fetched in bulk
    pub fn bulk_query(&self) -> &str {
        &self.bulk_query
    }

    /// Backend the leaf lives on
    pub fn backend(&self) -> &Arc<RemoteBackend> {
        &self.backend
    }

    /// Key of the bulk request covering `[start_time, end_time]`
    pub fn fetch_key(&self, start_time: i64, end_time: i64) -> RemoteResult<FetchKey> {
        let request = self.render_request(start_time, end_time)?;
        Ok(FetchKey::new(self.backend.address(), &request))
    }

    /// Fetch this leaf's data for a window, in epoch seconds
    ///
    /// Must be called within a tokio runtime. Fails immediately only if the
    /// request could not be built or dispatched; network failures surface
    /// when the deferred result is forced.
    pub fn fetch(&self, start_time: i64, end_time: i64) -> RemoteResult<FetchOutcome> {
        let request = match self.render_request(start_time, end_time) {
            Ok(request) => request,
            Err(e) => {
                self.backend.fail();
                metrics::record_fetch("error");
                return Err(e);
            }
        };
        let key = FetchKey::new(self.backend.address(), &request);
        let coordinator = &self.context.coordinator;

        coordinator.evict_if_needed();

        if let Some(result) = coordinator.cached_result(&key) {
            if let Some(data) = result.series_for(&self.path) {
                debug!(path = %self.path, url = %key, "Serving leaf from published bulk result");
                metrics::record_fetch("fast_path");
                return Ok(FetchOutcome::Ready(data));
            }
        }

        let record = coordinator.get_or_create(&key);

        if record.sender().try_claim() {
            self.dispatch(&key, &record, request)?;
            metrics::record_fetch("sent");
        } else {
            debug!(path = %self.path, url = %key, "Joining in-flight bulk fetch");
            metrics::record_fetch("coalesced");
        }

        Ok(FetchOutcome::Deferred(self.deferred(key, record)))
    }

    fn render_request(&self, start_time: i64, end_time: i64) -> RemoteResult<TransportRequest> {
        TransportRequest::render(
            &self.bulk_query,
            start_time,
            end_time,
            self.context.format.id(),
            self.context.coordinator.fetch_timeout(),
        )
        .map_err(|message| RemoteError::construction(self.backend.address(), message))
    }

    /// Start the bulk request in the background
    fn dispatch(
        &self,
        key: &FetchKey,
        record: &Arc<CoordinationRecord>,
        request: TransportRequest,
    ) -> RemoteResult<()> {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                // Release anyone already waiting on this key
                record.completion().fire();
                self.backend.fail();
                metrics::record_fetch("error");
                error!(url = %key, "Error requesting bulk fetch: no async runtime");
                return Err(RemoteError::construction(
                    self.backend.address(),
                    format!("no async runtime available: {}", e),
                ));
            }
        };

        info!(url = %key, "Requesting bulk fetch");

        let task = BulkFetch {
            backend: Arc::clone(&self.backend),
            context: self.context.clone(),
            key: key.clone(),
            record: Arc::clone(record),
        };
        record.set_in_flight(runtime.spawn(task.run(request)));
        Ok(())
    }

    fn deferred(
        &self,
        key: FetchKey,
        record: Arc<CoordinationRecord>,
    ) -> DeferredResult<Option<SeriesData>> {
        let backend = Arc::clone(&self.backend);
        let coordinator = Arc::clone(&self.context.coordinator);
        let path = self.path.clone();

        DeferredResult::new(move || {
            let backend = Arc::clone(&backend);
            let coordinator = Arc::clone(&coordinator);
            let record = Arc::clone(&record);
            let key = key.clone();
            let path = path.clone();

            async move {
                let result = wait_for_results(&backend, &coordinator, &key, &record).await?;
                Ok(result.series_for(&path))
            }
        })
    }
}

impl fmt::Debug for SeriesFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesFetcher")
            .field("backend", &self.backend.address())
            .field("path", &self.path)
            .field("bulk_query", &self.bulk_query)
            .field("intervals", &self.intervals)
            .finish()
    }
}

/// Obtain the bulk result for `key`, either by awaiting the dispatch task
/// or by waiting for it to be published
async fn wait_for_results(
    backend: &RemoteBackend,
    coordinator: &RequestCoordinator,
    key: &FetchKey,
    record: &CoordinationRecord,
) -> RemoteResult<Arc<BulkResult>> {
    let timeout = coordinator.fetch_timeout();

    if record.waiter().try_claim() {
        if let Some(handle) = record.take_in_flight() {
            return await_dispatch(backend, key, record, handle, timeout).await;
        }
        // The sender failed before dispatching or has not stored its task
        // yet; fall back to waiting like everyone else.
    }

    if !record.completion().wait(timeout).await {
        debug!(url = %key, "Timed out waiting for coalesced bulk fetch");
    }

    match coordinator.cached_result(key) {
        Some(result) => Ok(result),
        None => {
            backend.fail();
            metrics::record_fetch("error");
            error!(url = %key, "Passive remote fetch failed to find cached results");
            Err(RemoteError::CoalescedFetchMissing {
                backend: backend.address().to_string(),
                key: key.to_string(),
            })
        }
    }
}

async fn await_dispatch(
    backend: &RemoteBackend,
    key: &FetchKey,
    record: &CoordinationRecord,
    mut handle: DispatchHandle,
    timeout: Duration,
) -> RemoteResult<Arc<BulkResult>> {
    let failure = match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(outcome)) => return outcome,
        Ok(Err(join_error)) => format!("bulk fetch task failed: {}", join_error),
        Err(_) => {
            handle.abort();
            format!("bulk fetch timed out after {:?}", timeout)
        }
    };

    record.completion().fire();
    backend.fail();
    metrics::record_fetch("error");
    error!(url = %key, error = %failure, "Error requesting bulk fetch");
    Err(RemoteError::transport(backend.address(), failure))
}

/// Background task performing one bulk request
struct BulkFetch {
    backend: Arc<RemoteBackend>,
    context: FetchContext,
    key: FetchKey,
    record: Arc<CoordinationRecord>,
}

impl BulkFetch {
    async fn run(self, request: TransportRequest) -> RemoteResult<Arc<BulkResult>> {
        let started = Instant::now();
        let outcome = self.execute(request).await;
        metrics::record_fetch_duration(started.elapsed().as_secs_f64(), outcome.is_ok());

        match &outcome {
            Ok(result) => {
                debug!(url = %self.key, series = result.len(), "Bulk fetch completed");
                self.context.coordinator.publish(&self.key, Arc::clone(result));
            }
            Err(e) => {
                self.backend.fail();
                metrics::record_fetch("error");
                warn!(url = %self.key, error = %e, "Error requesting bulk fetch");
            }
        }

        // Publish before firing so woken waiters find the result
        self.record.completion().fire();
        outcome
    }

    async fn execute(&self, request: TransportRequest) -> RemoteResult<Arc<BulkResult>> {
        let address = self.backend.address();
        let timeout = request.timeout;

        let response = tokio::time::timeout(timeout, self.context.transport.send(address, request))
            .await
            .map_err(|_| {
                RemoteError::transport(address, format!("timed out after {:?}", timeout))
            })?
            .map_err(|e| RemoteError::from_transport(address, e))?;

        if !response.is_success() {
            return Err(RemoteError::transport(
                address,
                format!(
                    "Error response {} {} from {}",
                    response.status, response.reason, self.key
                ),
            ));
        }

        let result = self
            .context
            .format
            .decode_series(&response.body)
            .map_err(|message| RemoteError::decode(address, message))?;

        Ok(Arc::new(result))
    }
}
