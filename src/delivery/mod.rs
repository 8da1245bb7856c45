//! Sensor delivery: endpoint normalization and the outbound send
//!
//! The transport is a trait so the HTTP stack can be swapped out (tests use
//! `MemoryTransport`). `DeliveryClient` never returns an error from `send`;
//! failures are reported to the injected log and surface as `false`.

mod http;

pub use http::HttpTransport;

use crate::builder::SerializedEvent;
use crate::error::{Result, TrackerError};
use crate::log::EventLog;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::Level;
use url::Url;

/// The only status the sensor answers with on success
pub const SUCCESS_STATUS: u16 = 204;

pub const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

pub const API_KEY_HEADER: &str = "Api-Key";

/// Normalize a base URL into the sensor endpoint
///
/// The path always ends with `/`, query and fragment are dropped, and
/// `sensor/` is appended unless the last segment already is `sensor`.
/// Normalizing an already normalized URL is a no-op.
pub fn normalize_endpoint(base: &str) -> Result<Url> {
    normalize(base).map(|(url, _)| url)
}

fn normalize(base: &str) -> Result<(Url, bool)> {
    let mut url = Url::parse(base)
        .map_err(|e| TrackerError::Config(format!("Invalid sensor URL '{}': {}", base, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(TrackerError::Config(format!(
            "Sensor URL must use http or https, got '{}'",
            url.scheme()
        )));
    }
    if url.cannot_be_a_base() {
        return Err(TrackerError::Config(format!(
            "Sensor URL '{}' cannot carry a path",
            base
        )));
    }

    let mut path = url.path().to_string();
    if !path.ends_with('/') {
        path.push('/');
    }

    let appended = !path.ends_with("/sensor/");
    if appended {
        path.push_str("sensor/");
    }

    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);

    Ok((url, appended))
}

/// Form-urlencode every present field of a serialized event
pub fn encode_form(event: &SerializedEvent) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(event.form_pairs())
        .finish()
}

/// One outbound POST to the sensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorRequest {
    pub url: Url,
    pub api_key: String,
    pub body: String,
}

impl SensorRequest {
    /// Headers sent with every request
    pub fn headers(&self) -> [(&'static str, &str); 2] {
        [
            ("Content-Type", CONTENT_TYPE),
            (API_KEY_HEADER, self.api_key.as_str()),
        ]
    }
}

/// Transport that carries a request to the sensor
///
/// Returns the response status, or `Transport` if no response arrived.
#[async_trait]
pub trait SensorTransport: Send + Sync {
    async fn post(&self, request: &SensorRequest) -> Result<u16>;

    /// Transport name (e.g., "http", "memory")
    fn name(&self) -> &str;
}

/// Normalized endpoint, credential, and transport for sending events
pub struct DeliveryClient {
    endpoint: Url,
    api_key: String,
    transport: Arc<dyn SensorTransport>,
    log: Arc<dyn EventLog>,
}

impl DeliveryClient {
    /// Build a client, failing fast on an unusable endpoint
    pub fn new(
        base: &str,
        api_key: impl Into<String>,
        transport: Arc<dyn SensorTransport>,
        log: Arc<dyn EventLog>,
    ) -> Result<Self> {
        let (endpoint, appended) = normalize(base)?;
        if appended {
            log.log(
                Level::DEBUG,
                &format!("Sensor path was missing from '{}', using {}", base, endpoint),
            );
        }

        Ok(Self {
            endpoint,
            api_key: api_key.into(),
            transport,
            log,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Build the request for a serialized event
    pub fn request(&self, event: &SerializedEvent) -> SensorRequest {
        SensorRequest {
            url: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            body: encode_form(event),
        }
    }

    /// Send an event, returning whether the sensor accepted it
    pub async fn send(&self, event: &SerializedEvent) -> bool {
        let request = self.request(event);

        match self.transport.post(&request).await {
            Ok(SUCCESS_STATUS) => {
                self.log.log(
                    Level::DEBUG,
                    &format!("Tracker request sent. Response status is {}", SUCCESS_STATUS),
                );
                true
            }
            Ok(status) => {
                self.log.log(
                    Level::INFO,
                    &format!("Sensor returned unexpected response status {}", status),
                );
                false
            }
            Err(e) => {
                self.log
                    .log(Level::ERROR, &format!("Tracker send failed: {}", e));
                false
            }
        }
    }
}

/// In-memory transport for development and testing
///
/// Records every request and answers from a queue of scripted responses,
/// falling back to `default_status` when the queue is empty.
pub struct MemoryTransport {
    requests: Mutex<Vec<SensorRequest>>,
    responses: Mutex<VecDeque<Result<u16>>>,
    default_status: u16,
}

impl MemoryTransport {
    pub fn new(default_status: u16) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
            default_status,
        }
    }

    /// Queue a status for the next request
    pub fn push_status(&self, status: u16) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(status));
    }

    /// Queue a transport failure for the next request
    pub fn push_failure(&self, reason: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(TrackerError::Transport(reason.into())));
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<SensorRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(SUCCESS_STATUS)
    }
}

#[async_trait]
impl SensorTransport for MemoryTransport {
    async fn post(&self, request: &SensorRequest) -> Result<u16> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let scripted = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        scripted.unwrap_or(Ok(self.default_status))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
