//! Mapped-field extraction from host context
//!
//! A mapper reads values such as the logged-in user's name or email out of
//! an arbitrary JSON context (for example a serialized session) using
//! dot-separated paths:
//!
//! ```json
//! { "from": "session.user", "fields": { "userName": "username", "emailAddress": "email" } }
//! ```

use crate::builder::EventBuilder;
use crate::error::{Result, TrackerError};
use crate::types::{Field, FieldValue, PayloadEntry, ValueKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Declarative mapper settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperConfig {
    /// Path to the object the field paths are resolved against (empty = root)
    #[serde(default)]
    pub from: String,

    /// Field → path inside the `from` object
    #[serde(default)]
    pub fields: BTreeMap<Field, String>,
}

impl MapperConfig {
    pub fn new(from: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: Field, path: impl Into<String>) -> Self {
        self.fields.insert(field, path.into());
        self
    }

    /// Whether a path is configured for `field`
    pub fn maps(&self, field: Field) -> bool {
        self.fields.get(&field).is_some_and(|path| !path.is_empty())
    }
}

/// Compiled mapper with pre-split paths
#[derive(Debug, Clone)]
pub struct FieldMapper {
    from: Vec<String>,
    fields: Vec<(Field, Vec<String>)>,
}

impl FieldMapper {
    pub fn new(config: &MapperConfig) -> Result<Self> {
        let from = if config.from.is_empty() {
            Vec::new()
        } else {
            split_path(&config.from)?
        };

        let fields = config
            .fields
            .iter()
            .map(|(field, path)| split_path(path).map(|segments| (*field, segments)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { from, fields })
    }

    /// Resolve every mapped field present in `context`
    ///
    /// Values that are missing, null, or of the wrong shape are skipped.
    pub fn resolve(&self, context: &Value) -> Vec<(Field, FieldValue)> {
        let Some(source) = pick(context, &self.from).filter(|v| v.is_object()) else {
            return Vec::new();
        };

        self.fields
            .iter()
            .filter_map(|(field, path)| {
                pick(source, path)
                    .and_then(|value| to_field_value(*field, value))
                    .map(|value| (*field, value))
            })
            .collect()
    }

    /// Resolve and assign into `builder`, returning how many were applied
    ///
    /// Entries resolved for an append-only field are appended to what the
    /// record already holds.
    pub fn apply(&self, context: &Value, builder: &mut EventBuilder) -> usize {
        self.resolve(context)
            .into_iter()
            .filter(|(field, value)| match value {
                FieldValue::Entries(entries) if field.is_append_only() => {
                    entries.iter().fold(false, |applied, entry| {
                        builder.push_entry(*field, entry.clone()).is_applied() || applied
                    })
                }
                _ => builder.set(*field, value.clone()).is_applied(),
            })
            .count()
    }
}

fn split_path(path: &str) -> Result<Vec<String>> {
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(TrackerError::Config(format!(
            "Mapper path '{}' contains an empty segment",
            path
        )));
    }
    Ok(segments)
}

fn pick<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn to_field_value(field: Field, value: &Value) -> Option<FieldValue> {
    match (field.kind(), value) {
        (ValueKind::StatusCode, Value::Number(n)) => {
            n.as_u64().and_then(|n| u16::try_from(n).ok()).map(FieldValue::StatusCode)
        }
        (ValueKind::StatusCode, Value::String(s)) => s.trim().parse().ok().map(FieldValue::StatusCode),
        (ValueKind::Entries, Value::Array(_)) => serde_json::from_value::<Vec<PayloadEntry>>(value.clone())
            .ok()
            .map(FieldValue::Entries),
        (ValueKind::Text, Value::String(s)) => Some(FieldValue::Text(s.clone())),
        (ValueKind::Text, Value::Number(n)) => Some(FieldValue::Text(n.to_string())),
        (ValueKind::Text, Value::Bool(b)) => Some(FieldValue::Text(b.to_string())),
        _ => None,
    }
}
