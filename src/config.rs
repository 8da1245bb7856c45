//! Tracker options
//!
//! Options deserialize from camelCase JSON; every key is optional.

use crate::error::{Result, TrackerError};
use crate::mapper::MapperConfig;
use crate::types::{Field, FieldGroup, FieldSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How the tracker is integrated with the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Standalone use; mapped fields in `fields` need a mapper path
    #[default]
    Populated,
    /// Request middleware; handlers fill mapped fields through the handle
    Middleware,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Populated => write!(f, "populated"),
            Self::Middleware => write!(f, "middleware"),
        }
    }
}

/// User-configurable tracker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerOptions {
    /// Seconds a pending event survives before the next sweep drops it (default: 30)
    #[serde(default = "default_event_timeout_secs")]
    pub event_timeout_secs: u64,

    /// Include request-derived fields in the active set (default: true)
    #[serde(default = "default_populated")]
    pub populated: bool,

    /// Extra fields added to the active set
    #[serde(default)]
    pub fields: Vec<Field>,

    /// Paths for pulling mapped fields out of host context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapper: Option<MapperConfig>,

    #[serde(default)]
    pub mode: Mode,
}

fn default_event_timeout_secs() -> u64 {
    30
}

fn default_populated() -> bool {
    true
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            event_timeout_secs: default_event_timeout_secs(),
            populated: default_populated(),
            fields: Vec::new(),
            mapper: None,
            mode: Mode::default(),
        }
    }
}

impl TrackerOptions {
    /// Parse options from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_populated(mut self, populated: bool) -> Self {
        self.populated = populated;
        self
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn with_mapper(mut self, mapper: MapperConfig) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_secs(self.event_timeout_secs)
    }

    /// Compute the active field set
    ///
    /// Outside middleware mode, a mapped field listed in `fields` must have
    /// a mapper path, since nothing else would ever fill it.
    pub fn field_set(&self) -> Result<FieldSet> {
        if self.mode != Mode::Middleware {
            let unmapped: Vec<&str> = self
                .fields
                .iter()
                .filter(|f| f.group() == FieldGroup::Mapped)
                .filter(|f| !self.mapper.as_ref().is_some_and(|m| m.maps(**f)))
                .map(|f| f.name())
                .collect();

            if !unmapped.is_empty() {
                return Err(TrackerError::Config(format!(
                    "Mapped fields [{}] need mapper paths outside middleware mode",
                    unmapped.join(", ")
                )));
            }
        }

        let base = if self.populated {
            FieldSet::populated()
        } else {
            FieldSet::required()
        };
        Ok(base.with(self.fields.iter().copied()))
    }
}
