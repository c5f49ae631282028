//! Federated access to remote TSDB backends
//!
//! Queries fan out to peer backends through two operations:
//!
//! - [`MetadataLookup::lookup`]: find nodes matching a pattern, cached per
//!   time bucket in a [`MetadataCache`](crate::cache::MetadataCache)
//! - [`SeriesFetcher::fetch`]: read one leaf's data; leaves of the same
//!   lookup share one bulk request through the [`RequestCoordinator`]
//!
//! Any failure on either path marks the backend unavailable for its retry
//! delay ([`RemoteBackend`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use kuba_federation::cache::LocalMetadataCache;
//! use kuba_federation::config::RemoteConfig;
//! use kuba_federation::remote::{
//!     FetchContext, JsonFormat, MetadataLookup, RemoteBackend, RequestCoordinator, Transport,
//! };
//! use kuba_federation::types::Query;
//! use std::sync::Arc;
//!
//! # async fn example(transport: Arc<dyn Transport>) {
//! let config = RemoteConfig::default();
//! let context = FetchContext::new(
//!     transport,
//!     Arc::new(JsonFormat),
//!     Arc::new(RequestCoordinator::from_config(&config)),
//! );
//! let lookup = MetadataLookup::new(context, Arc::new(LocalMetadataCache::new(1000)), &config);
//! let backend = Arc::new(RemoteBackend::new("10.0.0.5:8080", config.retry_delay()));
//!
//! for node in lookup.lookup(&backend, &Query::new("servers.*.cpu").with_range(1000, 2000)).await {
//!     if let Some(reader) = node.reader() {
//!         let data = reader.fetch(1000, 2000).unwrap().resolve().await;
//!         println!("{}: {:?}", node.path(), data);
//!     }
//! }
//! # }
//! ```

pub mod coordinator;
pub mod deferred;
pub mod finder;
pub mod health;
pub mod reader;
pub mod transport;

pub use coordinator::{CompletionSignal, CoordinationRecord, FetchKey, Permit, RequestCoordinator};
pub use deferred::DeferredResult;
pub use finder::{BranchNode, FindResults, LeafNode, MetadataLookup, NodeDescriptor};
pub use health::RemoteBackend;
pub use reader::{FetchContext, FetchOutcome, SeriesFetcher};
pub use transport::{
    wire_format, JsonFormat, Transport, TransportRequest, TransportResponse, WireFormat,
};
