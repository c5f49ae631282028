//! Error types for the federation layer

use std::time::Duration;
use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Remote request error
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Metadata cache error
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures of a remote find or fetch
///
/// Every variant marks the owning backend as failed before it reaches the
/// caller. Callers higher up treat the backend as absent for this round.
/// Clone-able because a single coalesced outcome may be reported to
/// several callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request could not be built or dispatched; nothing was sent
    #[error("Request construction failed for {backend}: {message}")]
    RequestConstruction {
        /// Backend address
        backend: String,
        /// Description of the failure
        message: String,
    },

    /// Connection, timeout or non-success status while sending or reading
    #[error("Transport failure from {backend}: {message}")]
    Transport {
        /// Backend address
        backend: String,
        /// Description of the failure
        message: String,
    },

    /// Payload could not be decoded into the expected shape
    #[error("Decode failure from {backend}: {message}")]
    Decode {
        /// Backend address
        backend: String,
        /// Description of the failure
        message: String,
    },

    /// A coalesced waiter found no published result after waiting
    #[error("Coalesced fetch produced no result for {key}")]
    CoalescedFetchMissing {
        /// Backend address
        backend: String,
        /// Fetch key the waiter was attached to
        key: String,
    },
}

impl RemoteError {
    /// Backend address the failure is attributed to
    pub fn backend(&self) -> &str {
        match self {
            RemoteError::RequestConstruction { backend, .. }
            | RemoteError::Transport { backend, .. }
            | RemoteError::Decode { backend, .. }
            | RemoteError::CoalescedFetchMissing { backend, .. } => backend,
        }
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::RequestConstruction { .. } => "request_construction",
            RemoteError::Transport { .. } => "transport",
            RemoteError::Decode { .. } => "decode",
            RemoteError::CoalescedFetchMissing { .. } => "coalesced_missing",
        }
    }

    pub(crate) fn construction(backend: &str, message: impl Into<String>) -> Self {
        RemoteError::RequestConstruction {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn transport(backend: &str, message: impl Into<String>) -> Self {
        RemoteError::Transport {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn decode(backend: &str, message: impl Into<String>) -> Self {
        RemoteError::Decode {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    /// Classify a transport failure; requests rejected before sending are
    /// construction failures
    pub(crate) fn from_transport(backend: &str, err: TransportError) -> Self {
        match err {
            TransportError::InvalidRequest(_) => Self::construction(backend, err.to_string()),
            _ => Self::transport(backend, err.to_string()),
        }
    }
}

/// Errors raised by [`Transport`](crate::remote::Transport) implementations
#[derive(Error, Debug)]
pub enum TransportError {
    /// Could not connect to the backend
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The request did not complete in time
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The request was rejected before being sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// IO error on the underlying connection
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata cache errors
///
/// Never surfaced from lookups; a failing cache behaves like an empty one.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Connection to the cache backend failed
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Cache command failed
    #[error("Command error: {0}")]
    CommandError(String),

    /// Cached payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for remote operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;
