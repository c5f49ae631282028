//! Shared helpers for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use kuba_federation::cache::{LocalMetadataCache, MetadataCache};
use kuba_federation::config::RemoteConfig;
use kuba_federation::error::TransportError;
use kuba_federation::remote::transport::{FIND_PATH, RENDER_PATH};
use kuba_federation::remote::{
    FetchContext, JsonFormat, MetadataLookup, RemoteBackend, RequestCoordinator, Transport,
    TransportRequest, TransportResponse,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the mock does for one endpoint
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Reply with a status and body
    Respond { status: u16, body: String },
    /// Fail at the transport level
    Fail(String),
    /// Refuse the request before sending it
    Reject(String),
    /// Never answer
    Hang,
}

impl Behavior {
    pub fn ok(body: impl Into<String>) -> Self {
        Behavior::Respond {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Behavior::Respond {
            status,
            body: String::new(),
        }
    }
}

/// Scripted in-memory transport
pub struct MockTransport {
    find: Mutex<Behavior>,
    render: Mutex<Behavior>,
    delay: Mutex<Duration>,
    find_calls: AtomicUsize,
    render_calls: AtomicUsize,
    requests: Mutex<Vec<(String, TransportRequest)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            find: Mutex::new(Behavior::ok("[]")),
            render: Mutex::new(Behavior::ok("[]")),
            delay: Mutex::new(Duration::ZERO),
            find_calls: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_find(self, behavior: Behavior) -> Self {
        *self.find.lock() = behavior;
        self
    }

    pub fn with_render(self, behavior: Behavior) -> Self {
        *self.render.lock() = behavior;
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = delay;
        self
    }

    pub fn set_find(&self, behavior: Behavior) {
        *self.find.lock() = behavior;
    }

    pub fn set_render(&self, behavior: Behavior) {
        *self.render.lock() = behavior;
    }

    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(String, TransportRequest)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        address: &str,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let behavior = match request.path.as_str() {
            FIND_PATH => {
                self.find_calls.fetch_add(1, Ordering::SeqCst);
                self.find.lock().clone()
            }
            RENDER_PATH => {
                self.render_calls.fetch_add(1, Ordering::SeqCst);
                self.render.lock().clone()
            }
            other => {
                return Err(TransportError::InvalidRequest(format!(
                    "unexpected path {}",
                    other
                )))
            }
        };
        self.requests.lock().push((address.to_string(), request));

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match behavior {
            Behavior::Respond { status, body } => {
                let mut response = TransportResponse::ok(body);
                if status != 200 {
                    response.status = status;
                    response.reason = "Service Unavailable".to_string();
                }
                Ok(response)
            }
            Behavior::Fail(message) => Err(TransportError::Connect(message)),
            Behavior::Reject(message) => Err(TransportError::InvalidRequest(message)),
            Behavior::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Everything a test needs to drive lookups and fetches
pub struct Harness {
    pub transport: Arc<MockTransport>,
    pub coordinator: Arc<RequestCoordinator>,
    pub lookup: MetadataLookup,
    pub backend: Arc<RemoteBackend>,
}

pub fn config() -> RemoteConfig {
    RemoteConfig::default()
}

pub fn harness(transport: MockTransport, config: &RemoteConfig) -> Harness {
    let cache: Arc<dyn MetadataCache> = Arc::new(LocalMetadataCache::new(100));
    harness_with_cache(transport, config, cache)
}

pub fn harness_with_cache(
    transport: MockTransport,
    config: &RemoteConfig,
    cache: Arc<dyn MetadataCache>,
) -> Harness {
    let transport = Arc::new(transport);
    let coordinator = Arc::new(RequestCoordinator::from_config(config));
    let context = FetchContext::new(
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(JsonFormat),
        Arc::clone(&coordinator),
    );
    Harness {
        transport,
        coordinator,
        lookup: MetadataLookup::new(context, cache, config),
        backend: Arc::new(RemoteBackend::new("10.0.0.5:8080", config.retry_delay())),
    }
}

/// Render response body with one series per path
pub fn render_body(paths: &[&str], start: i64, end: i64, step: i64) -> String {
    let series: Vec<serde_json::Value> = paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            serde_json::json!({
                "name": path,
                "start": start,
                "end": end,
                "step": step,
                "values": [i as f64, null, (i * 10) as f64],
            })
        })
        .collect();
    serde_json::Value::Array(series).to_string()
}

/// Find response body with current-schema leaves
pub fn find_body(paths: &[&str], start: f64, end: f64) -> String {
    let records: Vec<serde_json::Value> = paths
        .iter()
        .map(|path| {
            serde_json::json!({
                "path": path,
                "is_leaf": true,
                "intervals": [[start, end]],
            })
        })
        .collect();
    serde_json::Value::Array(records).to_string()
}
