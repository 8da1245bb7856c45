//! Error types for a3s-tracker

use thiserror::Error;

/// Errors that can occur while configuring or running a tracker
///
/// Only `Config` ever reaches the caller of the public API. Everything
/// else is absorbed at the delivery boundary and reported through the
/// injected [`EventLog`](crate::log::EventLog).
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Malformed or missing endpoint URL, API key, or options
    #[error("Configuration error: {0}")]
    Config(String),

    /// The sensor could not be reached or the exchange broke off
    #[error("Transport error: {0}")]
    Transport(String),

    /// A field name that is not part of the event record
    #[error("Unknown event field: {0}")]
    UnknownField(String),

    /// An event type outside the sensor's enumerated domain
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;
