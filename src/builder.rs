//! Event record and the validation layer around it
//!
//! `EventBuilder` owns one event's fields and refuses any assignment that
//! falls outside the field set it was constructed with. Rejections are
//! returned as values; nothing here panics or errors on bad input.

use crate::types::{
    format_event_time, Assignment, EventType, Field, FieldSet, FieldValue, PayloadEntry, Rejection,
    ValueKind,
};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// Request-derived values supplied by the host's request-handling layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestInfo {
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub http_method: Option<String>,
    #[serde(default)]
    pub http_referer: Option<String>,
    #[serde(default)]
    pub browser_language: Option<String>,
}

impl RequestInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ip_address(mut self, value: impl Into<String>) -> Self {
        self.ip_address = Some(value.into());
        self
    }

    pub fn with_user_agent(mut self, value: impl Into<String>) -> Self {
        self.user_agent = Some(value.into());
        self
    }

    pub fn with_url(mut self, value: impl Into<String>) -> Self {
        self.url = Some(value.into());
        self
    }

    pub fn with_http_method(mut self, value: impl Into<String>) -> Self {
        self.http_method = Some(value.into());
        self
    }

    pub fn with_http_referer(mut self, value: impl Into<String>) -> Self {
        self.http_referer = Some(value.into());
        self
    }

    pub fn with_browser_language(mut self, value: impl Into<String>) -> Self {
        self.browser_language = Some(value.into());
        self
    }
}

/// Mutable event record bound to a fixed field set
#[derive(Debug, Clone)]
pub struct EventBuilder {
    fields: FieldSet,
    values: BTreeMap<Field, FieldValue>,
}

macro_rules! text_setters {
    ($($(#[$doc:meta])* $name:ident => $field:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self, value: impl Into<String>) -> &mut Self {
                self.set($field, FieldValue::Text(value.into()));
                self
            }
        )*
    };
}

impl EventBuilder {
    /// Create an empty record restricted to `fields`
    pub fn new(fields: FieldSet) -> Self {
        Self {
            fields,
            values: BTreeMap::new(),
        }
    }

    /// The active field set this record was created with
    pub fn field_set(&self) -> &FieldSet {
        &self.fields
    }

    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    /// Text value of a field, if assigned and textual
    pub fn text(&self, field: Field) -> Option<&str> {
        self.values.get(&field).and_then(FieldValue::as_text)
    }

    pub fn is_assigned(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }

    /// Fields currently holding a value
    pub fn assigned(&self) -> impl Iterator<Item = Field> + '_ {
        self.values.keys().copied()
    }

    /// Assign a field, validated against the active field set
    ///
    /// `eventType` only accepts values from [`EventType`]. Setting
    /// `ipAddress` while `userName` is unset copies the address into
    /// `userName` as well. `fieldHistory` is never replaced; use
    /// [`push_entry`](Self::push_entry).
    pub fn set(&mut self, field: Field, value: impl Into<FieldValue>) -> Assignment {
        if !self.fields.contains(field) {
            return Assignment::Rejected(Rejection::OutsideFieldSet(field));
        }
        if field.is_append_only() {
            return Assignment::Rejected(Rejection::AppendOnly(field));
        }

        let value = value.into();
        if value.kind() != field.kind() {
            return Assignment::Rejected(Rejection::KindMismatch {
                field,
                expected: field.kind(),
            });
        }

        match (field, &value) {
            (Field::EventType, FieldValue::Text(text)) if text.parse::<EventType>().is_err() => {
                return Assignment::Rejected(Rejection::UnknownEventType(text.clone()));
            }
            (Field::IpAddress, _) if !self.values.contains_key(&Field::UserName) => {
                self.values.insert(Field::UserName, value.clone());
            }
            _ => {}
        }

        self.values.insert(field, value);
        Assignment::Applied
    }

    /// Append one entry to a list field (`payload` or `fieldHistory`)
    pub fn push_entry(&mut self, field: Field, entry: PayloadEntry) -> Assignment {
        if !self.fields.contains(field) {
            return Assignment::Rejected(Rejection::OutsideFieldSet(field));
        }
        if field.kind() != ValueKind::Entries {
            return Assignment::Rejected(Rejection::KindMismatch {
                field,
                expected: field.kind(),
            });
        }

        match self
            .values
            .entry(field)
            .or_insert_with(|| FieldValue::Entries(Vec::new()))
        {
            FieldValue::Entries(entries) => {
                entries.push(entry);
                Assignment::Applied
            }
            _ => Assignment::Rejected(Rejection::KindMismatch {
                field,
                expected: field.kind(),
            }),
        }
    }

    text_setters! {
        set_user_name => Field::UserName;
        set_ip_address => Field::IpAddress;
        set_url => Field::Url;
        /// Explicit event time, expected as `YYYY-MM-DD HH:mm:ss.mmm`
        set_event_time => Field::EventTime;
        set_user_agent => Field::UserAgent;
        set_browser_language => Field::BrowserLanguage;
        set_http_method => Field::HttpMethod;
        set_http_referer => Field::HttpReferer;
        set_page_title => Field::PageTitle;
        set_full_name => Field::FullName;
        set_first_name => Field::FirstName;
        set_last_name => Field::LastName;
        set_email_address => Field::EmailAddress;
        set_phone_number => Field::PhoneNumber;
        set_user_created => Field::UserCreated;
    }

    pub fn set_event_time_at(&mut self, time: DateTime<Utc>) -> &mut Self {
        self.set(Field::EventTime, format_event_time(time));
        self
    }

    pub fn set_http_code(&mut self, code: u16) -> &mut Self {
        self.set(Field::HttpCode, code);
        self
    }

    pub fn set_event_type(&mut self, event_type: EventType) -> &mut Self {
        self.set(Field::EventType, event_type);
        self
    }

    pub fn add_payload_entry(&mut self, entry: PayloadEntry) -> &mut Self {
        self.push_entry(Field::Payload, entry);
        self
    }

    pub fn add_field_history_entry(&mut self, entry: PayloadEntry) -> &mut Self {
        self.push_entry(Field::FieldHistory, entry);
        self
    }

    /// Copy request-derived values into the record
    ///
    /// Only fields in the active set are applied. Returns how many were.
    pub fn populate(&mut self, request: &RequestInfo) -> usize {
        let values = [
            (Field::IpAddress, &request.ip_address),
            (Field::Url, &request.url),
            (Field::UserAgent, &request.user_agent),
            (Field::BrowserLanguage, &request.browser_language),
            (Field::HttpMethod, &request.http_method),
            (Field::HttpReferer, &request.http_referer),
        ];

        values
            .into_iter()
            .filter_map(|(field, value)| value.as_ref().map(|v| (field, v)))
            .filter(|(field, value)| self.set(*field, value.as_str()).is_applied())
            .count()
    }

    /// Whether the assigned fields are exactly the active field set
    ///
    /// `eventTime` always resolves at serialization, so it counts as
    /// assigned. Both missing and unexpected fields make the record invalid.
    pub fn is_valid(&self) -> bool {
        let mut assigned: BTreeSet<Field> = self.values.keys().copied().collect();
        assigned.insert(Field::EventTime);

        assigned.len() == self.fields.len() && self.fields.iter().all(|f| assigned.contains(&f))
    }

    /// Serialize with the current wall clock as the default event time
    pub fn serialize(&self) -> SerializedEvent {
        self.serialize_at(Utc::now())
    }

    /// Serialize, defaulting an unset `eventTime` to `now`
    pub fn serialize_at(&self, now: DateTime<Utc>) -> SerializedEvent {
        let mut values = self.values.clone();
        let mut defaulted = Vec::new();

        for field in Field::REQUIRED {
            if values.contains_key(&field) {
                continue;
            }
            if field == Field::EventTime {
                values.insert(field, FieldValue::Text(format_event_time(now)));
            } else {
                values.insert(field, FieldValue::Text(String::new()));
                defaulted.push(field);
            }
        }

        SerializedEvent { values, defaulted }
    }
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self::new(FieldSet::default())
    }
}

/// Ordered snapshot of a record, ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedEvent {
    values: BTreeMap<Field, FieldValue>,
    defaulted: Vec<Field>,
}

impl SerializedEvent {
    pub fn get(&self, field: Field) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn text(&self, field: Field) -> Option<&str> {
        self.values.get(&field).and_then(FieldValue::as_text)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &FieldValue)> {
        self.values.iter().map(|(field, value)| (*field, value))
    }

    /// Required fields that were unset and filled with `""`
    pub fn defaulted(&self) -> &[Field] {
        &self.defaulted
    }

    /// Flatten into form key/value pairs
    ///
    /// List fields use indexed brackets: `payload[0][field_id]`.
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.values.len());
        for (field, value) in &self.values {
            match value {
                FieldValue::Text(text) => pairs.push((field.name().to_string(), text.clone())),
                FieldValue::StatusCode(code) => {
                    pairs.push((field.name().to_string(), code.to_string()))
                }
                FieldValue::Entries(entries) => {
                    for (index, entry) in entries.iter().enumerate() {
                        for (key, value) in entry.pairs() {
                            pairs.push((
                                format!("{}[{}][{}]", field.name(), index, key),
                                value.to_string(),
                            ));
                        }
                    }
                }
            }
        }
        pairs
    }
}

impl Serialize for SerializedEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in &self.values {
            map.serialize_entry(field.name(), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 8, 15, 0).unwrap()
    }

    #[test]
    fn test_required_only_assignment() {
        let mut event = EventBuilder::new(FieldSet::required());
        event
            .set_user_name("nickname")
            .set_ip_address("1.1.1.1")
            .set_url("https://example.io")
            .set_event_time("2024-05-17 08:15:00.000");

        let dump = event.serialize_at(fixed_now());
        assert_eq!(dump.len(), 4);
        assert_eq!(dump.text(Field::UserName), Some("nickname"));
        assert_eq!(dump.text(Field::EventTime), Some("2024-05-17 08:15:00.000"));
        assert!(event.is_valid());
    }

    #[test]
    fn test_field_outside_set_is_ignored() {
        let mut event = EventBuilder::new(FieldSet::required());
        let before = event.serialize_at(fixed_now());

        let result = event.set(Field::UserAgent, "curl/8.0");
        assert_eq!(result, Assignment::Rejected(Rejection::OutsideFieldSet(Field::UserAgent)));

        event.set_page_title("Home").set_http_code(200);
        assert_eq!(event.serialize_at(fixed_now()), before);
    }

    #[test]
    fn test_user_name_defaults_from_ip() {
        let mut event = EventBuilder::new(FieldSet::required());
        event.set_ip_address("1.1.1.1");
        assert_eq!(event.text(Field::UserName), Some("1.1.1.1"));

        event.set_user_name("nickname");
        assert_eq!(event.text(Field::UserName), Some("nickname"));

        event.set_ip_address("2.2.2.2");
        assert_eq!(event.text(Field::UserName), Some("nickname"));
        assert_eq!(event.text(Field::IpAddress), Some("2.2.2.2"));
    }

    #[test]
    fn test_explicit_user_name_before_ip_is_kept() {
        let mut event = EventBuilder::new(FieldSet::required());
        event.set_user_name("alice").set_ip_address("1.1.1.1");
        assert_eq!(event.serialize_at(fixed_now()).text(Field::UserName), Some("alice"));
    }

    #[test]
    fn test_event_type_whitelist() {
        let mut event = EventBuilder::new(FieldSet::custom([Field::EventType]));

        let result = event.set(Field::EventType, "bogus");
        assert_eq!(result, Assignment::Rejected(Rejection::UnknownEventType("bogus".into())));
        assert!(event.get(Field::EventType).is_none());

        assert!(event.set(Field::EventType, "account_edit").is_applied());
        event.set(Field::EventType, "bogus");
        assert_eq!(
            event.serialize_at(fixed_now()).text(Field::EventType),
            Some("account_edit")
        );

        event.set_event_type(EventType::PageSearch);
        assert_eq!(event.text(Field::EventType), Some("page_search"));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut event = EventBuilder::new(FieldSet::populated());
        assert_eq!(
            event.set(Field::HttpCode, "200"),
            Assignment::Rejected(Rejection::KindMismatch {
                field: Field::HttpCode,
                expected: ValueKind::StatusCode,
            })
        );
        assert!(event.set(Field::HttpCode, 404u16).is_applied());
    }

    #[test]
    fn test_required_fields_default_to_empty() {
        let event = EventBuilder::new(FieldSet::populated());
        let dump = event.serialize_at(fixed_now());

        assert_eq!(dump.len(), 4);
        assert_eq!(dump.text(Field::UserName), Some(""));
        assert_eq!(dump.text(Field::IpAddress), Some(""));
        assert_eq!(dump.text(Field::Url), Some(""));
        assert_eq!(dump.text(Field::EventTime), Some("2024-05-17 08:15:00.000"));
        assert_eq!(dump.defaulted(), &[Field::UserName, Field::IpAddress, Field::Url]);
        assert!(!dump.contains(Field::UserAgent));
    }

    #[test]
    fn test_is_valid_requires_exact_set() {
        let mut event = EventBuilder::new(FieldSet::required());
        event.set_user_name("alice").set_ip_address("1.1.1.1");
        assert!(!event.is_valid());

        event.set_url("/login");
        assert!(event.is_valid());

        let mut custom = EventBuilder::new(FieldSet::custom([Field::PageTitle]));
        custom.set_page_title("Login").set_ip_address("1.1.1.1");
        assert!(!custom.is_valid());
        custom.set_url("/login");
        assert!(custom.is_valid());
    }

    #[test]
    fn test_payload_and_history_entries() {
        let mut event =
            EventBuilder::new(FieldSet::custom([Field::Payload, Field::FieldHistory]));
        event
            .add_payload_entry(PayloadEntry::new("email", "a@b.c").with_old_value("x@y.z"))
            .add_field_history_entry(
                PayloadEntry::new("42", "Bob").with_field_name("name").with_parent_name("user"),
            )
            .add_field_history_entry(PayloadEntry::new("43", "Smith"));

        let dump = event.serialize_at(fixed_now());
        match dump.get(Field::FieldHistory) {
            Some(FieldValue::Entries(entries)) => assert_eq!(entries.len(), 2),
            other => panic!("unexpected field history: {:?}", other),
        }

        let pairs = dump.form_pairs();
        assert!(pairs.contains(&("payload[0][field_id]".into(), "email".into())));
        assert!(pairs.contains(&("payload[0][old_value]".into(), "x@y.z".into())));
        assert!(pairs.contains(&("fieldHistory[0][parent_name]".into(), "user".into())));
        assert!(pairs.contains(&("fieldHistory[1][new_value]".into(), "Smith".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "fieldHistory[1][field_name]"));
    }

    #[test]
    fn test_field_history_cannot_be_replaced() {
        let mut event = EventBuilder::new(FieldSet::custom([Field::FieldHistory]));
        event
            .add_field_history_entry(PayloadEntry::new("42", "Bob"))
            .add_field_history_entry(PayloadEntry::new("43", "Smith"));

        let result = event.set(Field::FieldHistory, Vec::<PayloadEntry>::new());
        assert_eq!(result, Assignment::Rejected(Rejection::AppendOnly(Field::FieldHistory)));

        let result = event.set(Field::FieldHistory, vec![PayloadEntry::new("1", "x")]);
        assert!(!result.is_applied());

        match event.get(Field::FieldHistory) {
            Some(FieldValue::Entries(entries)) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[1].new_value, "Smith");
            }
            other => panic!("unexpected field history: {:?}", other),
        }
    }

    #[test]
    fn test_entries_rejected_outside_set() {
        let mut event = EventBuilder::new(FieldSet::required());
        let result = event.push_entry(Field::Payload, PayloadEntry::new("a", "b"));
        assert!(!result.is_applied());
        assert!(!event.serialize_at(fixed_now()).contains(Field::Payload));
    }

    #[test]
    fn test_populate_respects_field_set() {
        let request = RequestInfo::new()
            .with_ip_address("10.0.0.1")
            .with_url("/cart")
            .with_user_agent("Mozilla/5.0")
            .with_http_method("GET");

        let mut required = EventBuilder::new(FieldSet::required());
        assert_eq!(required.populate(&request), 2);
        assert_eq!(required.text(Field::UserName), Some("10.0.0.1"));
        assert!(!required.is_assigned(Field::UserAgent));

        let mut populated = EventBuilder::new(FieldSet::populated());
        assert_eq!(populated.populate(&request), 4);
        assert_eq!(populated.text(Field::HttpMethod), Some("GET"));
    }

    #[test]
    fn test_serialized_json_order() {
        let mut event = EventBuilder::new(FieldSet::all());
        event
            .set_event_type(EventType::AccountLogin)
            .set_url("/login")
            .set_user_name("alice")
            .set_http_code(204);

        let json = serde_json::to_string(&event.serialize_at(fixed_now())).unwrap();
        assert_eq!(
            json,
            r#"{"userName":"alice","ipAddress":"","url":"/login","eventTime":"2024-05-17 08:15:00.000","httpCode":204,"eventType":"account_login"}"#
        );
    }
}
