//! Transport and wire format seams
//!
//! The network client is supplied by the host application through the
//! [`Transport`] trait; connection handling, authentication, proxying and
//! socket timeouts live there. Payload decoding goes through
//! [`WireFormat`], with JSON built in.
//!
//! Request shapes:
//!
//! ```text
//! find:   GET /metrics/find/?local=1&format=<id>&query=<pattern>[&from=<s>][&until=<s>]
//! render: GET /render/?target=<pattern>&format=<id>&local=1&noCache=1&from=<s>&until=<s>
//! ```

use crate::error::TransportError;
use crate::types::{BulkResult, Query, RawNodeRecord};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use url::form_urlencoded;

/// Path of the metadata endpoint
pub const FIND_PATH: &str = "/metrics/find/";

/// Path of the bulk data endpoint
pub const RENDER_PATH: &str = "/render/";

/// A GET request to a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    /// Endpoint path
    pub path: String,
    /// Query parameters in order
    pub params: Vec<(String, String)>,
    /// Transport-level timeout
    pub timeout: Duration,
}

impl TransportRequest {
    /// Build a find request
    ///
    /// `local=1` keeps the backend from federating the query any further.
    pub fn find(query: &Query, format: &str, timeout: Duration) -> Result<Self, String> {
        if query.pattern.is_empty() {
            return Err("find pattern cannot be empty".to_string());
        }
        if format.is_empty() {
            return Err("format cannot be empty".to_string());
        }
        if let (Some(start), Some(end)) = (query.start_time, query.end_time) {
            if start > end {
                return Err(format!("Invalid time range: from {} > until {}", start, end));
            }
        }

        let mut params = vec![
            ("local".to_string(), "1".to_string()),
            ("format".to_string(), format.to_string()),
            ("query".to_string(), query.pattern.clone()),
        ];
        if let Some(start) = query.start_time {
            params.push(("from".to_string(), start.to_string()));
        }
        if let Some(end) = query.end_time {
            params.push(("until".to_string(), end.to_string()));
        }

        Ok(Self {
            path: FIND_PATH.to_string(),
            params,
            timeout,
        })
    }

    /// Build a bulk render request
    pub fn render(
        target: &str,
        start_time: i64,
        end_time: i64,
        format: &str,
        timeout: Duration,
    ) -> Result<Self, String> {
        if target.is_empty() {
            return Err("render target cannot be empty".to_string());
        }
        if format.is_empty() {
            return Err("format cannot be empty".to_string());
        }
        if start_time > end_time {
            return Err(format!(
                "Invalid time range: from {} > until {}",
                start_time, end_time
            ));
        }

        let params = vec![
            ("target".to_string(), target.to_string()),
            ("format".to_string(), format.to_string()),
            ("local".to_string(), "1".to_string()),
            ("noCache".to_string(), "1".to_string()),
            ("from".to_string(), start_time.to_string()),
            ("until".to_string(), end_time.to_string()),
        ];

        Ok(Self {
            path: RENDER_PATH.to_string(),
            params,
            timeout,
        })
    }

    /// URL-encoded query string
    pub fn query_string(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish()
    }

    /// Path plus query string, e.g. `/render/?target=a&...`
    pub fn path_and_query(&self) -> String {
        format!("{}?{}", self.path, self.query_string())
    }

    /// Full URL on a backend
    pub fn url(&self, address: &str) -> String {
        format!("http://{}{}", address, self.path_and_query())
    }

    /// Value of a parameter, if present
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A backend response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP-like status code
    pub status: u16,
    /// Status reason phrase
    pub reason: String,
    /// Raw payload
    pub body: Bytes,
}

impl TransportResponse {
    /// A 200 response with a body
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            reason: "OK".to_string(),
            body: body.into(),
        }
    }

    /// A response with an arbitrary status and empty body
    pub fn with_status(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            body: Bytes::new(),
        }
    }

    /// True for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request/response client for backends
///
/// Implementations must honor `request.timeout` and fail with
/// [`TransportError::Timeout`] when it expires. Non-success statuses are
/// returned as responses, not errors; the caller checks them.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `request` to the backend at `address`
    async fn send(
        &self,
        address: &str,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError>;
}

/// Payload encoding spoken with backends
pub trait WireFormat: Send + Sync + 'static {
    /// Identifier sent as the `format` parameter
    fn id(&self) -> &str;

    /// Decode a find response into raw records
    fn decode_nodes(&self, body: &[u8]) -> Result<Vec<RawNodeRecord>, String>;

    /// Decode a render response
    fn decode_series(&self, body: &[u8]) -> Result<BulkResult, String>;
}

/// JSON wire format
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl WireFormat for JsonFormat {
    fn id(&self) -> &str {
        "json"
    }

    fn decode_nodes(&self, body: &[u8]) -> Result<Vec<RawNodeRecord>, String> {
        serde_json::from_slice(body).map_err(|e| format!("invalid find payload: {}", e))
    }

    fn decode_series(&self, body: &[u8]) -> Result<BulkResult, String> {
        serde_json::from_slice(body).map_err(|e| format!("invalid render payload: {}", e))
    }
}

/// Wire format for a configured format id
pub fn wire_format(id: &str) -> Option<Arc<dyn WireFormat>> {
    match id {
        "json" => Some(Arc::new(JsonFormat)),
        _ => None,
    }
}
