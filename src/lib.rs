//! # a3s-tracker
//!
//! Correlated tracking events with deferred, best-effort delivery to a
//! sensor endpoint.
//!
//! ## Overview
//!
//! A request handler creates an event, enriches it while the request is
//! processed, and tracks it once the response is out. Each event is held
//! under a random correlation id until it is delivered or its TTL runs
//! out. Tracking never fails the host: only configuration errors at
//! construction are returned, everything else goes to the log.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use a3s_tracker::{EventType, RequestInfo, Tracker, TrackerOptions};
//!
//! # async fn example() -> a3s_tracker::Result<()> {
//! let tracker = Tracker::new("https://sensor.example.com", "API_KEY", TrackerOptions::default())?;
//!
//! let request = RequestInfo::new()
//!     .with_ip_address("203.0.113.7")
//!     .with_url("/login")
//!     .with_http_method("POST");
//! let event = tracker.create_request_event(&request, None).await;
//!
//! // ...handle the request...
//! event.edit(|e| {
//!     e.set_user_name("alice");
//! });
//!
//! // After the response has been sent
//! tracker.track_detached(event);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **EventBuilder** — one event's fields, validated against a fixed field set
//! - **EventStore** — correlation-id table with lazy TTL sweep and at-most-once removal
//! - **DeliveryClient** — endpoint normalization and the form-encoded POST
//! - **SensorTransport** trait — HTTP (reqwest) or in-memory
//! - **Tracker** — façade wiring the above

pub mod builder;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
mod id;
pub mod log;
pub mod mapper;
pub mod store;
pub mod tracker;
pub mod types;

// Re-export core types
pub use builder::{EventBuilder, RequestInfo, SerializedEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Mode, TrackerOptions};
pub use delivery::{
    normalize_endpoint, DeliveryClient, HttpTransport, MemoryTransport, SensorRequest,
    SensorTransport,
};
pub use error::{Result, TrackerError};
pub use log::{EventLog, LogRecord, MemoryLog, TracingLog};
pub use mapper::{FieldMapper, MapperConfig};
pub use store::{EventHandle, EventStore, TrackOutcome};
pub use tracker::{mask, Configurations, Tracker, TrackerBuilder};
pub use types::{
    Assignment, EventType, Field, FieldGroup, FieldSet, FieldValue, PayloadEntry, Rejection,
    ValueKind,
};
