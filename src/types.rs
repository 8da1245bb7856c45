//! Core value types for tracking events
//!
//! Field names serialize in camelCase and event types in snake_case, which
//! is what the sensor expects on the wire.

use crate::error::TrackerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A single field of an event record
///
/// Declaration order is the serialization order: required fields first,
/// then request-populated fields, then mapped fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    UserName,
    IpAddress,
    Url,
    EventTime,

    UserAgent,
    BrowserLanguage,
    HttpMethod,
    HttpReferer,
    HttpCode,

    PageTitle,
    FullName,
    FirstName,
    LastName,
    EmailAddress,
    PhoneNumber,
    UserCreated,
    EventType,
    Payload,
    FieldHistory,
}

/// Which partition of the record a field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    /// Always present in the serialized form, defaulted to `""`
    Required,
    /// Derivable from the incoming request
    Populated,
    /// Must be supplied explicitly by the host application
    Mapped,
}

/// Shape of the value a field accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    StatusCode,
    Entries,
}

impl Field {
    pub const REQUIRED: [Field; 4] = [
        Field::UserName,
        Field::IpAddress,
        Field::Url,
        Field::EventTime,
    ];

    pub const POPULATED: [Field; 5] = [
        Field::UserAgent,
        Field::BrowserLanguage,
        Field::HttpMethod,
        Field::HttpReferer,
        Field::HttpCode,
    ];

    pub const MAPPED: [Field; 10] = [
        Field::PageTitle,
        Field::FullName,
        Field::FirstName,
        Field::LastName,
        Field::EmailAddress,
        Field::PhoneNumber,
        Field::UserCreated,
        Field::EventType,
        Field::Payload,
        Field::FieldHistory,
    ];

    /// Wire name of the field
    pub fn name(self) -> &'static str {
        match self {
            Self::UserName => "userName",
            Self::IpAddress => "ipAddress",
            Self::Url => "url",
            Self::EventTime => "eventTime",
            Self::UserAgent => "userAgent",
            Self::BrowserLanguage => "browserLanguage",
            Self::HttpMethod => "httpMethod",
            Self::HttpReferer => "httpReferer",
            Self::HttpCode => "httpCode",
            Self::PageTitle => "pageTitle",
            Self::FullName => "fullName",
            Self::FirstName => "firstName",
            Self::LastName => "lastName",
            Self::EmailAddress => "emailAddress",
            Self::PhoneNumber => "phoneNumber",
            Self::UserCreated => "userCreated",
            Self::EventType => "eventType",
            Self::Payload => "payload",
            Self::FieldHistory => "fieldHistory",
        }
    }

    pub fn group(self) -> FieldGroup {
        if Self::REQUIRED.contains(&self) {
            FieldGroup::Required
        } else if Self::POPULATED.contains(&self) {
            FieldGroup::Populated
        } else {
            FieldGroup::Mapped
        }
    }

    pub fn is_required(self) -> bool {
        self.group() == FieldGroup::Required
    }

    /// List fields that only grow through appended entries
    pub fn is_append_only(self) -> bool {
        matches!(self, Self::FieldHistory)
    }

    pub fn kind(self) -> ValueKind {
        match self {
            Self::HttpCode => ValueKind::StatusCode,
            Self::Payload | Self::FieldHistory => ValueKind::Entries,
            _ => ValueKind::Text,
        }
    }

    /// Every field, in serialization order
    pub fn all() -> impl Iterator<Item = Field> {
        Self::REQUIRED
            .into_iter()
            .chain(Self::POPULATED)
            .chain(Self::MAPPED)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::all()
            .find(|field| field.name() == s)
            .ok_or_else(|| TrackerError::UnknownField(s.to_string()))
    }
}

/// Event type domain accepted by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PageView,
    PageEdit,
    PageDelete,
    PageSearch,
    AccountLogin,
    AccountLogout,
    AccountLoginFail,
    AccountRegistration,
    AccountEmailChange,
    AccountPasswordChange,
    AccountEdit,
    PageError,
    FieldEdit,
}

impl EventType {
    pub const ALL: [EventType; 13] = [
        EventType::PageView,
        EventType::PageEdit,
        EventType::PageDelete,
        EventType::PageSearch,
        EventType::AccountLogin,
        EventType::AccountLogout,
        EventType::AccountLoginFail,
        EventType::AccountRegistration,
        EventType::AccountEmailChange,
        EventType::AccountPasswordChange,
        EventType::AccountEdit,
        EventType::PageError,
        EventType::FieldEdit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::PageEdit => "page_edit",
            Self::PageDelete => "page_delete",
            Self::PageSearch => "page_search",
            Self::AccountLogin => "account_login",
            Self::AccountLogout => "account_logout",
            Self::AccountLoginFail => "account_login_fail",
            Self::AccountRegistration => "account_registration",
            Self::AccountEmailChange => "account_email_change",
            Self::AccountPasswordChange => "account_password_change",
            Self::AccountEdit => "account_edit",
            Self::PageError => "page_error",
            Self::FieldEdit => "field_edit",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TrackerError::UnknownEventType(s.to_string()))
    }
}

/// One entry of the `payload` or `fieldHistory` lists
///
/// Optional keys are only serialized when set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadEntry {
    pub field_id: String,
    pub new_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
}

impl PayloadEntry {
    pub fn new(field_id: impl Into<String>, new_value: impl Into<String>) -> Self {
        Self {
            field_id: field_id.into(),
            new_value: new_value.into(),
            old_value: None,
            field_name: None,
            parent_id: None,
            parent_name: None,
        }
    }

    pub fn with_old_value(mut self, value: impl Into<String>) -> Self {
        self.old_value = Some(value.into());
        self
    }

    pub fn with_field_name(mut self, value: impl Into<String>) -> Self {
        self.field_name = Some(value.into());
        self
    }

    pub fn with_parent_id(mut self, value: impl Into<String>) -> Self {
        self.parent_id = Some(value.into());
        self
    }

    pub fn with_parent_name(mut self, value: impl Into<String>) -> Self {
        self.parent_name = Some(value.into());
        self
    }

    /// Present keys with their values, in wire order
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![
            ("field_id", self.field_id.as_str()),
            ("new_value", self.new_value.as_str()),
        ];
        let optional = [
            ("old_value", &self.old_value),
            ("field_name", &self.field_name),
            ("parent_id", &self.parent_id),
            ("parent_name", &self.parent_name),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                pairs.push((key, value.as_str()));
            }
        }
        pairs
    }
}

/// Value held by one field of the record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    StatusCode(u16),
    Entries(Vec<PayloadEntry>),
}

impl FieldValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::Text,
            Self::StatusCode(_) => ValueKind::StatusCode,
            Self::Entries(_) => ValueKind::Entries,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u16> for FieldValue {
    fn from(value: u16) -> Self {
        Self::StatusCode(value)
    }
}

impl From<EventType> for FieldValue {
    fn from(value: EventType) -> Self {
        Self::Text(value.as_str().to_string())
    }
}

impl From<Vec<PayloadEntry>> for FieldValue {
    fn from(value: Vec<PayloadEntry>) -> Self {
        Self::Entries(value)
    }
}

/// The closed set of fields an [`EventBuilder`](crate::builder::EventBuilder)
/// may assign
///
/// Required fields are always members; the set never grows after the
/// builder is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSet(BTreeSet<Field>);

impl FieldSet {
    /// `userName`, `ipAddress`, `url`, `eventTime`
    pub fn required() -> Self {
        Self(Field::REQUIRED.into_iter().collect())
    }

    /// Required fields plus the request-derived ones
    pub fn populated() -> Self {
        Self(Field::REQUIRED.into_iter().chain(Field::POPULATED).collect())
    }

    /// Required fields plus an arbitrary selection
    pub fn custom(fields: impl IntoIterator<Item = Field>) -> Self {
        let mut set = Self::required();
        set.0.extend(fields);
        set
    }

    /// Every known field
    pub fn all() -> Self {
        Self(Field::all().collect())
    }

    /// Extend with additional fields (configuration time only)
    pub fn with(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.0.extend(fields);
        self
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains(&field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Field> + '_ {
        self.0.iter().copied()
    }
}

impl Default for FieldSet {
    fn default() -> Self {
        Self::populated()
    }
}

/// Result of assigning a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Applied,
    Rejected(Rejection),
}

impl Assignment {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Why an assignment was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The field is not part of the active field set
    OutsideFieldSet(Field),
    /// `eventType` value outside the enumerated domain
    UnknownEventType(String),
    /// Value shape does not fit the field
    KindMismatch { field: Field, expected: ValueKind },
    /// The field only accepts appended entries
    AppendOnly(Field),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutsideFieldSet(field) => write!(f, "field {} is not in the active field set", field),
            Self::UnknownEventType(value) => write!(f, "unknown event type '{}'", value),
            Self::KindMismatch { field, expected } => {
                write!(f, "field {} expects a {:?} value", field, expected)
            }
            Self::AppendOnly(field) => write!(f, "field {} can only be appended to", field),
        }
    }
}

/// Format a timestamp the way the sensor expects: `YYYY-MM-DD HH:mm:ss.mmm` (UTC)
pub fn format_event_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}
