//! Tracker façade
//!
//! `Tracker` wires the pending-event store, the field mapper, and the
//! delivery client behind `create_event` / `get_event` / `track`. It is
//! cheap to clone; clones share the same store.

use crate::builder::RequestInfo;
use crate::clock::{Clock, SystemClock};
use crate::config::{Mode, TrackerOptions};
use crate::delivery::{DeliveryClient, HttpTransport, SensorTransport};
use crate::error::{Result, TrackerError};
use crate::log::{EventLog, TracingLog};
use crate::mapper::FieldMapper;
use crate::store::{EventHandle, EventStore, TrackOutcome};
use crate::types::Field;
use reqwest::header::HeaderValue;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Environment variable holding the sensor base URL
pub const URL_ENV: &str = "TRACKER_URL";

/// Environment variable holding the API key
pub const KEY_ENV: &str = "TRACKER_KEY";

/// Render a value for diagnostics, hiding it when sensitive
///
/// ```rust
/// use a3s_tracker::mask;
///
/// assert_eq!(mask("key", "secret", true), "key[string] ******");
/// assert_eq!(mask("url", "https://a.b", false), "url[string] https://a.b");
/// assert_eq!(mask("key", "", true), "\"key\" value is empty");
/// ```
pub fn mask(name: &str, value: &str, sensitive: bool) -> String {
    if value.is_empty() {
        format!("\"{}\" value is empty", name)
    } else if sensitive {
        format!("{}[string] ******", name)
    } else {
        format!("{}[string] {}", name, value)
    }
}

/// Read-only view of a tracker's configuration, safe to log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Configurations {
    /// Normalized sensor endpoint
    pub endpoint: String,
    /// Masked API key
    pub key: String,
    pub mode: Mode,
    /// Active field set
    pub fields: Vec<Field>,
    pub event_timeout_secs: u64,
    pub transport: String,
}

/// Builder for a [`Tracker`] with non-default collaborators
pub struct TrackerBuilder {
    url: String,
    key: String,
    options: TrackerOptions,
    transport: Option<Arc<dyn SensorTransport>>,
    clock: Option<Arc<dyn Clock>>,
    log: Option<Arc<dyn EventLog>>,
}

impl TrackerBuilder {
    pub fn options(mut self, options: TrackerOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the HTTP transport
    pub fn transport(mut self, transport: Arc<dyn SensorTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the default `tracing` log
    pub fn log(mut self, log: Arc<dyn EventLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Validate the configuration and build the tracker
    pub fn build(self) -> Result<Tracker> {
        let settings = || {
            format!(
                "{}, {}",
                mask("url", &self.url, false),
                mask("key", &self.key, true)
            )
        };

        if self.url.trim().is_empty() || self.key.is_empty() {
            return Err(TrackerError::Config(format!(
                "Required tracker settings are missing: {}",
                settings()
            )));
        }
        if HeaderValue::from_str(&self.key).is_err() {
            return Err(TrackerError::Config(format!(
                "API key cannot be sent as a header: {}",
                settings()
            )));
        }

        let field_set = self.options.field_set()?;
        let mapper = self
            .options
            .mapper
            .as_ref()
            .map(FieldMapper::new)
            .transpose()?;

        let log = self.log.unwrap_or_else(|| Arc::new(TracingLog));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };

        let delivery = DeliveryClient::new(&self.url, self.key.clone(), transport, log.clone())?;
        let store = EventStore::new(field_set, self.options.event_timeout(), clock, log);

        Ok(Tracker {
            inner: Arc::new(Inner {
                store,
                delivery,
                mapper,
                key: self.key,
                options: self.options,
            }),
        })
    }
}

struct Inner {
    store: EventStore,
    delivery: DeliveryClient,
    mapper: Option<FieldMapper>,
    key: String,
    options: TrackerOptions,
}

/// Creates, correlates, and delivers tracking events
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<Inner>,
}

impl Tracker {
    /// Create a tracker sending over HTTP and logging through `tracing`
    pub fn new(url: impl Into<String>, key: impl Into<String>, options: TrackerOptions) -> Result<Self> {
        Self::builder(url, key).options(options).build()
    }

    pub fn builder(url: impl Into<String>, key: impl Into<String>) -> TrackerBuilder {
        TrackerBuilder {
            url: url.into(),
            key: key.into(),
            options: TrackerOptions::default(),
            transport: None,
            clock: None,
            log: None,
        }
    }

    /// Create a tracker from `TRACKER_URL` and `TRACKER_KEY`
    pub fn from_env(options: TrackerOptions) -> Result<Self> {
        let url = std::env::var(URL_ENV).unwrap_or_default();
        let key = std::env::var(KEY_ENV).unwrap_or_default();
        Self::new(url, key, options)
    }

    /// Start a new pending event
    pub async fn create_event(&self) -> EventHandle {
        self.inner.store.create_event().await
    }

    /// Start a new pending event filled from the current request
    ///
    /// Request values are applied first, then the mapper (when configured
    /// and a context is given), so mapped values win over derived ones.
    pub async fn create_request_event(
        &self,
        request: &RequestInfo,
        context: Option<&serde_json::Value>,
    ) -> EventHandle {
        let handle = self.create_event().await;
        handle.edit(|event| {
            event.populate(request);
            if let (Some(mapper), Some(context)) = (&self.inner.mapper, context) {
                mapper.apply(context, event);
            }
        });
        handle
    }

    /// Look up a pending event by correlation id
    pub async fn get_event(&self, id: &Uuid) -> Option<EventHandle> {
        self.inner.store.get_event(id).await
    }

    /// Deliver a pending event
    ///
    /// Never fails; the outcome is informational and every failure is
    /// also reported to the log.
    pub async fn track(&self, handle: &EventHandle) -> TrackOutcome {
        self.inner.store.track(handle, &self.inner.delivery).await
    }

    /// Deliver on a spawned task, without blocking the caller
    ///
    /// Call after the response has been finalized. Must run inside a
    /// tokio runtime.
    pub fn track_detached(&self, handle: EventHandle) -> JoinHandle<TrackOutcome> {
        let tracker = self.clone();
        tokio::spawn(async move { tracker.track(&handle).await })
    }

    /// Configuration view with the key masked
    pub fn configurations(&self) -> Configurations {
        Configurations {
            endpoint: self.inner.delivery.endpoint().to_string(),
            key: mask("key", &self.inner.key, true),
            mode: self.inner.options.mode,
            fields: self.inner.store.field_set().iter().collect(),
            event_timeout_secs: self.inner.options.event_timeout_secs,
            transport: self.inner.delivery.transport_name().to_string(),
        }
    }

    /// Underlying pending-event store
    pub fn store(&self) -> &EventStore {
        &self.inner.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::MemoryTransport;
    use crate::mapper::MapperConfig;

    fn memory_tracker(url: &str, key: &str, options: TrackerOptions) -> Result<Tracker> {
        Tracker::builder(url, key)
            .options(options)
            .transport(Arc::new(MemoryTransport::default()))
            .build()
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("key", "abc", true), "key[string] ******");
        assert_eq!(mask("url", "https://x", false), "url[string] https://x");
        assert_eq!(mask("url", "", false), "\"url\" value is empty");
    }

    #[test]
    fn test_config_failures_mask_key() {
        let err = memory_tracker("", "super-secret", TrackerOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, TrackerError::Config(_)));
        assert!(!err.to_string().contains("super-secret"));

        assert!(matches!(
            memory_tracker("https://sensor.example.com", "", TrackerOptions::default()),
            Err(TrackerError::Config(_))
        ));
        assert!(matches!(
            memory_tracker("no scheme here", "key", TrackerOptions::default()),
            Err(TrackerError::Config(_))
        ));

        let err = memory_tracker("https://sensor.example.com", "bad\nkey", TrackerOptions::default())
            .err()
            .unwrap();
        assert!(!err.to_string().contains("bad\nkey"));
    }

    #[test]
    fn test_options_errors_surface_at_construction() {
        let options = TrackerOptions::default().with_fields([Field::EmailAddress]);
        assert!(matches!(
            memory_tracker("https://sensor.example.com", "key", options),
            Err(TrackerError::Config(_))
        ));

        let options = TrackerOptions::default()
            .with_mode(Mode::Middleware)
            .with_mapper(MapperConfig::new("a..b"));
        assert!(matches!(
            memory_tracker("https://sensor.example.com", "key", options),
            Err(TrackerError::Config(_))
        ));
    }

    #[test]
    fn test_configurations_view() {
        let tracker = memory_tracker(
            "https://sensor.example.com/api?debug=1",
            "super-secret",
            TrackerOptions::default().with_populated(false),
        )
        .unwrap();

        let config = tracker.configurations();
        assert_eq!(config.endpoint, "https://sensor.example.com/api/sensor/");
        assert_eq!(config.key, "key[string] ******");
        assert_eq!(config.mode, Mode::Populated);
        assert_eq!(config.fields, Field::REQUIRED.to_vec());
        assert_eq!(config.event_timeout_secs, 30);
        assert_eq!(config.transport, "memory");

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn test_default_transport_is_http() {
        let tracker = Tracker::new("https://sensor.example.com", "key", TrackerOptions::default()).unwrap();
        assert_eq!(tracker.configurations().transport, "http");
    }
}
