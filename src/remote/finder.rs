//! Remote metadata lookup
//!
//! Resolves a [`Query`] against one backend into node descriptors. Responses
//! are normalized, cached per time bucket, and materialized lazily: leaves
//! carry a [`SeriesFetcher`] bound to the queried pattern so that every
//! leaf of one lookup shares a single bulk fetch.

use crate::cache::{MetadataCache, MetadataCacheKey};
use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};
use crate::metrics;
use crate::types::{IntervalSet, NodeRecord, Query, RawNodeRecord};

use super::health::RemoteBackend;
use super::reader::{FetchContext, SeriesFetcher};
use super::transport::TransportRequest;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A leaf node on a remote backend
#[derive(Debug, Clone)]
pub struct LeafNode {
    path: String,
    reader: SeriesFetcher,
}

impl LeafNode {
    /// Full metric path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Reader bound to this leaf
    pub fn reader(&self) -> &SeriesFetcher {
        &self.reader
    }

    /// Known data coverage
    pub fn intervals(&self) -> &IntervalSet {
        self.reader.intervals()
    }
}

/// A branch node on a remote backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchNode {
    path: String,
}

impl BranchNode {
    /// Full metric path
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// One node yielded by a lookup
#[derive(Debug, Clone)]
pub enum NodeDescriptor {
    /// Metric with data
    Leaf(LeafNode),
    /// Namespace node without data
    Branch(BranchNode),
}

impl NodeDescriptor {
    /// Full metric path
    pub fn path(&self) -> &str {
        match self {
            NodeDescriptor::Leaf(leaf) => leaf.path(),
            NodeDescriptor::Branch(branch) => branch.path(),
        }
    }

    /// True for leaves
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeDescriptor::Leaf(_))
    }

    /// Remote nodes are never local
    pub fn is_local(&self) -> bool {
        false
    }

    /// Coverage of a leaf; `None` for branches
    pub fn intervals(&self) -> Option<&IntervalSet> {
        match self {
            NodeDescriptor::Leaf(leaf) => Some(leaf.intervals()),
            NodeDescriptor::Branch(_) => None,
        }
    }

    /// Reader of a leaf; `None` for branches
    pub fn reader(&self) -> Option<&SeriesFetcher> {
        match self {
            NodeDescriptor::Leaf(leaf) => Some(leaf.reader()),
            NodeDescriptor::Branch(_) => None,
        }
    }
}

/// One-shot sequence of descriptors produced by a lookup
///
/// Records are materialized as they are consumed. A failed lookup yields
/// nothing and keeps the error for inspection.
#[derive(Debug)]
pub struct FindResults {
    records: std::vec::IntoIter<NodeRecord>,
    materialize: Option<Materializer>,
    error: Option<RemoteError>,
    from_cache: bool,
}

#[derive(Debug)]
struct Materializer {
    backend: Arc<RemoteBackend>,
    context: FetchContext,
    bulk_query: String,
}

impl Materializer {
    fn descriptor(&self, record: NodeRecord) -> NodeDescriptor {
        if !record.is_leaf {
            return NodeDescriptor::Branch(BranchNode { path: record.path });
        }

        // Records were validated when normalized; a cached record with a
        // broken interval degrades to unknown coverage
        let intervals = IntervalSet::from_pairs(&record.intervals).unwrap_or_else(|e| {
            debug!(path = %record.path, error = %e, "Ignoring invalid leaf intervals");
            IntervalSet::empty()
        });

        let reader = SeriesFetcher::new(
            Arc::clone(&self.backend),
            self.context.clone(),
            record.path.clone(),
            intervals,
            Some(self.bulk_query.clone()),
        );

        NodeDescriptor::Leaf(LeafNode {
            path: record.path,
            reader,
        })
    }
}

impl FindResults {
    fn new(records: Vec<NodeRecord>, materialize: Materializer, from_cache: bool) -> Self {
        Self {
            records: records.into_iter(),
            materialize: Some(materialize),
            error: None,
            from_cache,
        }
    }

    /// Empty results for a lookup that failed
    pub fn failed(error: RemoteError) -> Self {
        Self {
            records: Vec::new().into_iter(),
            materialize: None,
            error: Some(error),
            from_cache: false,
        }
    }

    /// True if the backend contributed nothing because the lookup failed
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// The failure, if any
    pub fn error(&self) -> Option<&RemoteError> {
        self.error.as_ref()
    }

    /// True if served from the metadata cache
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }
}

impl Iterator for FindResults {
    type Item = NodeDescriptor;

    fn next(&mut self) -> Option<NodeDescriptor> {
        let materialize = self.materialize.as_ref()?;
        self.records.next().map(|record| materialize.descriptor(record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}

/// Metadata lookup against remote backends
pub struct MetadataLookup {
    context: FetchContext,
    cache: Arc<dyn MetadataCache>,
    cache_duration: Duration,
    find_timeout: Duration,
}

impl MetadataLookup {
    /// Create a lookup using `cache` for find responses
    pub fn new(context: FetchContext, cache: Arc<dyn MetadataCache>, config: &RemoteConfig) -> Self {
        Self {
            context,
            cache,
            cache_duration: config.find_cache_duration(),
            find_timeout: config.find_timeout(),
        }
    }

    /// Cache key used for `query` against `backend`
    pub fn cache_key(&self, backend: &RemoteBackend, query: &Query) -> MetadataCacheKey {
        MetadataCacheKey::new(backend.address(), query, self.cache_duration)
    }

    /// Find nodes matching `query` on `backend`
    ///
    /// Never fails outright: a failing backend is marked unavailable and
    /// contributes an empty, failed result.
    pub async fn lookup(&self, backend: &Arc<RemoteBackend>, query: &Query) -> FindResults {
        let key = self.cache_key(backend, query);
        let materialize = Materializer {
            backend: Arc::clone(backend),
            context: self.context.clone(),
            bulk_query: query.pattern.clone(),
        };

        if let Some(records) = self.cache.get(&key).await {
            debug!(key = %key, nodes = records.len(), "Find served from cache");
            metrics::record_find("cached");
            return FindResults::new(records, materialize, true);
        }

        match self.request(backend, query).await {
            Ok(records) => {
                self.cache.set(&key, &records, self.cache_duration).await;
                metrics::record_find("sent");
                FindResults::new(records, materialize, false)
            }
            Err(e) => {
                backend.fail();
                metrics::record_find("error");
                warn!(backend = %backend.address(), %query, error = %e, "Find request failed");
                FindResults::failed(e)
            }
        }
    }

    async fn request(&self, backend: &RemoteBackend, query: &Query) -> RemoteResult<Vec<NodeRecord>> {
        let address = backend.address();
        let request = TransportRequest::find(query, self.context.format().id(), self.find_timeout)
            .map_err(|message| RemoteError::construction(address, message))?;

        info!(backend = %address, url = %request.url(address), "Sending find request");

        let response = tokio::time::timeout(
            self.find_timeout,
            self.context.transport().send(address, request),
        )
        .await
        .map_err(|_| RemoteError::transport(address, format!("timed out after {:?}", self.find_timeout)))?
        .map_err(|e| RemoteError::from_transport(address, e))?;

        if !response.is_success() {
            return Err(RemoteError::transport(
                address,
                format!("Error response {} {} from find", response.status, response.reason),
            ));
        }

        let raw: Vec<RawNodeRecord> = self
            .context
            .format()
            .decode_nodes(&response.body)
            .map_err(|message| RemoteError::decode(address, message))?;

        raw.into_iter()
            .map(RawNodeRecord::normalize)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|message| RemoteError::decode(address, message))
    }
}

impl std::fmt::Debug for MetadataLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataLookup")
            .field("cache_duration", &self.cache_duration)
            .field("find_timeout", &self.find_timeout)
            .finish()
    }
}
