//! Kuba Federation - remote query layer for Kuba TSDB
//!
//! This library lets a node answer queries using peer backends:
//! - Per-backend circuit breaking with automatic recovery
//! - Find (metadata) lookups cached per time bucket, locally or in Redis
//! - Coalesced bulk fetches: one network request per pattern and window
//! - Legacy and current metadata schemas accepted side by side

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Find result caches (in-process, Redis, disabled)
pub mod cache;

/// Configuration management with TOML support
pub mod config;

/// Tracing subscriber setup
pub mod logging;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Remote backends: health, lookups, coalesced fetches
pub mod remote;

// Re-export main types
pub use config::Config;
pub use error::{Error, RemoteError, Result};
pub use remote::{FetchOutcome, MetadataLookup, NodeDescriptor, RemoteBackend, SeriesFetcher};
pub use types::{Query, SeriesData, TimeInfo};
